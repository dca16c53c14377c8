//! # Visualizer State Module
//!
//! The marker-to-mesh pipeline. Batches pushed by a transport are queued,
//! and once per frame `VisualizerState::tick` drains at most one of them into
//! the render slots while the pipeline gate is open.
//!
//! ## Key Components
//!
//! * `VisualizerState` - The pipeline: queue, gate, slots and scheduler
//! * `MaybeVisualizer` - A pipeline that stays inert when startup fails
//! * `marker_queue` - The FIFO shared with the transport thread
//! * `gate` - The single in-flight conversion latch
//! * `rendering` - Slots, meshes and the triangulate + transform engine
//! * `tasks` - The per-slot conversion task
//! * `analysis` - Keyed performance instrumentation
//!
//! ## Tick Order
//!
//! 1. Resume every in-flight conversion once
//! 2. Fire a gate release whose delay has passed
//! 3. If a batch is queued and the gate is open, dispatch it

pub mod analysis;
pub mod config;
pub mod gate;
pub mod marker;
pub mod marker_queue;
pub mod rendering;
pub mod task_management;
pub mod tasks;
pub mod transport;

use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;
use web_time::Instant;

use crate::core::{StResource, StSystem};
use analysis::{DisabledAnalysis, PerformanceAnalysis, PerformanceSink, MESH_KEY};
use config::{ConfigError, VisualizerConfig};
use gate::{BatchId, GateHold, PipelineGate};
use marker::MarkerBatch;
use marker_queue::{MarkerQueue, MarkerSink};
use rendering::{
    mesh_processing::{
        Accelerator, AcceleratorError, MeshProcessingUnit, ProcessingStrategy, WgpuAccelerator,
    },
    slot_name, RenderSlot, RenderSurface,
};
use task_management::TaskManager;
use tasks::mesh_conversion_task::MeshConversionTask;
use transport::{MarkerTransport, TransportError};

/// Parent of the slot targets when no render target is configured.
pub const DEFAULT_PARENT: &str = "VisualizedMesh";

#[derive(Debug, Error)]
pub enum VisualizerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("accelerator unavailable: {0}")]
    Accelerator(#[from] AcceleratorError),
}

/// The running marker-to-mesh pipeline.
///
/// # Examples
///
/// ```rust,ignore
/// let mut visualizer = VisualizerState::new(config, Box::new(transport), &mut surface, None)?;
///
/// // Frame loop
/// loop {
///     visualizer.tick(web_time::Instant::now());
/// }
/// ```
pub struct VisualizerState {
    config: VisualizerConfig,
    /// Batches waiting for the gate
    queue: MarkerQueue,
    gate: PipelineGate,
    /// One persistent destination per fan-out position
    slots: Vec<StResource<RenderSlot>>,
    /// Conversion settings shared by every task
    processing_unit: StSystem<MeshProcessingUnit>,
    /// Scheduler for in-flight conversions
    task_manager: TaskManager,
    analysis: Arc<dyn PerformanceSink>,
    transport: Box<dyn MarkerTransport>,
    next_batch: BatchId,
    shut_down: bool,
}

impl VisualizerState {
    /// Builds the pipeline and subscribes it to the configured topic.
    ///
    /// # Arguments
    /// * `config` - Validated before anything is created
    /// * `transport` - Source of marker batches
    /// * `surface` - Asked for one render target per slot
    /// * `accelerator` - Selects the accelerated strategy when present
    ///
    /// # Returns
    /// The running pipeline, or the error that kept it from starting
    pub fn new(
        config: VisualizerConfig,
        mut transport: Box<dyn MarkerTransport>,
        surface: &mut dyn RenderSurface,
        accelerator: Option<Box<dyn Accelerator>>,
    ) -> Result<Self, VisualizerError> {
        config.validate()?;

        let analysis: Arc<dyn PerformanceSink> = if config.enable_instrumentation {
            Arc::new(PerformanceAnalysis::new(
                config.analysis_directory.clone(),
                config.analysis_label.as_deref(),
            ))
        } else {
            Arc::new(DisabledAnalysis)
        };

        let processing_unit = match accelerator {
            Some(accelerator) => MeshProcessingUnit::accelerated(config.remap_stride, accelerator),
            None => MeshProcessingUnit::time_sliced(config.remap_stride, config.mesh_stride),
        };
        let strategy = processing_unit.strategy();

        let parent = config.render_target.as_deref().unwrap_or(DEFAULT_PARENT);
        let slots = (0..config.slot_count)
            .map(|index| {
                let name = slot_name(index, config.slot_count);
                let target = surface.create_target(parent, &name);
                if target.is_none() {
                    error!("Could not create render target {} under {}.", name, parent);
                }
                StResource::new(RenderSlot::new(name, target))
            })
            .collect();

        let queue = MarkerQueue::new(analysis.clone());
        transport.subscribe(&config.topic_name, queue.sink())?;

        info!(
            "Visualizer listening on {} with {} slot(s) under {}, {:?} strategy",
            config.topic_name, config.slot_count, parent, strategy
        );

        Ok(VisualizerState {
            gate: PipelineGate::new(config.release_delay_duration()),
            config,
            queue,
            slots,
            processing_unit: StSystem::new(Box::new(processing_unit)),
            task_manager: TaskManager::new(),
            analysis,
            transport,
            next_batch: 0,
            shut_down: false,
        })
    }

    /// Runs one scheduler step. Call once per frame.
    pub fn tick(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }

        self.task_manager.process_tasks(now);
        self.gate.refresh(now);

        if self.queue.is_empty() {
            return;
        }
        debug!("Queue size: {}", self.queue.len());

        let Some(hold) = self.gate.close(self.next_batch) else {
            debug!(
                "Batch {:?} in flight, next batch stays queued.",
                self.gate.owner()
            );
            return;
        };
        self.next_batch += 1;

        self.dispatch(hold, now);
    }

    /// Pops the head batch and starts one conversion per renderable marker.
    /// A hold that mints no lease reopens the gate when it goes out of scope.
    fn dispatch(&mut self, mut hold: GateHold, now: Instant) {
        let Some(batch) = self.queue.pop() else {
            return;
        };
        let batch_id = hold.owner();
        self.analysis.tick(MESH_KEY);

        let mut markers = batch.markers.into_iter();
        let mut conversions = Vec::new();
        for (slot_index, slot) in self.slots.iter().enumerate() {
            match markers.next() {
                Some(marker) if marker.is_renderable() => {
                    let lease = hold.lease();
                    slot.get_mut().set_visible(true);
                    conversions.push(MeshConversionTask::new(
                        slot_index,
                        marker,
                        slot.clone(),
                        self.processing_unit.clone(),
                        self.analysis.clone(),
                        lease,
                        now,
                    ));
                }
                Some(marker) => {
                    warn!(
                        "Skipping marker for slot {}: type {} with {} point(s) is not a renderable triangle list.",
                        slot_index,
                        marker.marker_type.0,
                        marker.vertex_count()
                    );
                    slot.get_mut().set_visible(false);
                }
                None => {
                    debug!("No marker for slot {} in batch {}.", slot_index, batch_id);
                    slot.get_mut().set_visible(false);
                }
            }
        }

        let dropped = markers.count();
        if dropped > 0 {
            debug!("Dropped {} marker(s) beyond the slot count.", dropped);
        }

        if conversions.is_empty() {
            debug!("Batch {} had nothing to convert, reopening gate.", batch_id);
            return;
        }

        for conversion in conversions {
            self.task_manager.publish_task(Box::new(conversion), now);
        }
    }

    /// Pushes a batch as if it had arrived from the transport.
    pub fn on_message_received(&self, batch: MarkerBatch) {
        self.queue.sink().on_message_received(batch);
    }

    /// A producer handle feeding this pipeline's queue.
    pub fn sink(&self) -> MarkerSink {
        self.queue.sink()
    }

    pub fn is_gate_open(&self) -> bool {
        self.gate.is_open()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn tasks_in_flight(&self) -> usize {
        self.task_manager.tasks_in_flight()
    }

    pub fn slots(&self) -> &[StResource<RenderSlot>] {
        &self.slots
    }

    pub fn strategy(&self) -> ProcessingStrategy {
        self.processing_unit.get().strategy()
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Unsubscribes from the transport, drops in-flight conversions and
    /// saves the performance report. Runs at most once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.transport.unsubscribe(&self.config.topic_name);

        let dropped = self.task_manager.drop_all();
        if dropped > 0 {
            info!("Dropped {} in-flight conversion(s) on shutdown.", dropped);
        }
        self.gate.refresh(Instant::now());

        self.analysis.save_to_file();
        info!("Visualizer on {} shut down.", self.config.topic_name);
    }
}

impl Drop for VisualizerState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A visualizer that may have failed to start.
///
/// A missing collaborator at startup leaves the pipeline `Inert`: every call
/// becomes a no-op and the host process keeps running.
pub enum MaybeVisualizer {
    Inert,
    Running(VisualizerState),
}

impl MaybeVisualizer {
    /// Starts the pipeline, creating the GPU accelerator when configured.
    ///
    /// Startup errors are logged and yield `MaybeVisualizer::Inert`.
    pub fn start(
        config: VisualizerConfig,
        transport: Box<dyn MarkerTransport>,
        surface: &mut dyn RenderSurface,
    ) -> Self {
        match Self::try_start(config, transport, surface) {
            Ok(state) => MaybeVisualizer::Running(state),
            Err(e) => {
                error!("Visualizer stays inert: {}", e);
                MaybeVisualizer::Inert
            }
        }
    }

    fn try_start(
        config: VisualizerConfig,
        transport: Box<dyn MarkerTransport>,
        surface: &mut dyn RenderSurface,
    ) -> Result<VisualizerState, VisualizerError> {
        config.validate()?;
        let accelerator = if config.use_accelerator {
            let accelerator: Box<dyn Accelerator> =
                Box::new(WgpuAccelerator::new(&config.shader_path)?);
            Some(accelerator)
        } else {
            None
        };
        VisualizerState::new(config, transport, surface, accelerator)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, MaybeVisualizer::Running(_))
    }

    pub fn state(&self) -> Option<&VisualizerState> {
        match self {
            MaybeVisualizer::Running(state) => Some(state),
            MaybeVisualizer::Inert => None,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let MaybeVisualizer::Running(state) = self {
            state.tick(now);
        }
    }

    pub fn shutdown(&mut self) {
        if let MaybeVisualizer::Running(state) = self {
            state.shutdown();
        }
    }
}
