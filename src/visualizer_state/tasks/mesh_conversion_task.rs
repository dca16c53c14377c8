//! Task converting one marker into one render slot's mesh.
//!
//! The conversion runs through three stages, one tick at a time:
//!
//! 1. **Packing**: the coordinate pass, yielding at its stride boundaries
//! 2. **Transform**: the accelerator round trip, if the unit has one
//! 3. **Building**: the mesh build, followed by the commit to the target
//!
//! The task holds the batch's `GateLease` and settles it on the way out.
//! If the task is dropped before it finishes, the lease's own `Drop`
//! releases the gate.

use std::sync::Arc;

use log::{debug, error};
use web_time::Instant;

use crate::{
    core::{StResource, StSystem},
    visualizer_state::{
        analysis::{conversion_key, PerformanceSink},
        gate::GateLease,
        marker::Marker,
        rendering::{
            mesh_processing::{MeshBuild, MeshProcessingUnit, Progress, VertexPacking},
            RenderSlot,
        },
        task_management::task::{Task, TaskStatus},
    },
};

enum Stage {
    Packing(VertexPacking),
    Building(MeshBuild),
    Finished,
}

/// Converts one marker into the mesh of one `RenderSlot`.
pub struct MeshConversionTask {
    /// Index of the destination slot
    slot_index: usize,
    /// The marker being converted
    marker: Marker,
    /// Destination slot, shared with the visualizer
    slot: StResource<RenderSlot>,
    /// Stride settings and accelerator
    processing_unit: StSystem<MeshProcessingUnit>,
    /// Timing side channel
    analysis: Arc<dyn PerformanceSink>,
    /// This conversion's hold on the pipeline gate
    lease: Option<GateLease>,
    stage: Stage,
    started: Instant,
}

impl MeshConversionTask {
    /// Creates a conversion task and opens its timing interval.
    ///
    /// # Arguments
    /// * `slot_index` - Index of the destination slot
    /// * `marker` - A renderable triangle-list marker
    /// * `slot` - The destination slot
    /// * `processing_unit` - Shared conversion settings
    /// * `analysis` - Timing sink
    /// * `lease` - Gate lease to settle when the conversion ends
    /// * `now` - Dispatch time
    pub fn new(
        slot_index: usize,
        marker: Marker,
        slot: StResource<RenderSlot>,
        processing_unit: StSystem<MeshProcessingUnit>,
        analysis: Arc<dyn PerformanceSink>,
        lease: GateLease,
        now: Instant,
    ) -> Self {
        let packing = processing_unit.get().begin_packing(&marker);
        analysis.start_record(&conversion_key(slot_index));

        MeshConversionTask {
            slot_index,
            marker,
            slot,
            processing_unit,
            analysis,
            lease: Some(lease),
            stage: Stage::Packing(packing),
            started: now,
        }
    }

    fn commit(&mut self, build: MeshBuild, now: Instant) {
        let mut slot = self.slot.get_mut();
        let slot_name = slot.name().to_string();
        let (mesh, target) = slot.mesh_and_target();
        build.apply(mesh);

        let Some(target) = target else {
            error!(
                "Slot {} has no render target, conversion result discarded.",
                slot_name
            );
            drop(slot);
            self.abort();
            return;
        };
        target.commit(mesh);
        let vertex_count = mesh.vertex_count();
        drop(slot);

        if let Some(lease) = self.lease.take() {
            lease.complete(now);
        }
        self.analysis.stop_record(&conversion_key(self.slot_index));
        debug!(
            "Slot {} committed {} vertices in {:.2} ms",
            slot_name,
            vertex_count,
            now.saturating_duration_since(self.started).as_secs_f64() * 1000.0
        );
    }

    fn abort(&mut self) {
        self.stage = Stage::Finished;
        if let Some(lease) = self.lease.take() {
            lease.fail();
        }
    }
}

impl Task for MeshConversionTask {
    /// Advances the conversion to its next yield point.
    ///
    /// # Returns
    /// `TaskStatus::Complete` once the mesh is committed or the conversion
    /// was abandoned
    fn resume(&mut self, now: Instant) -> TaskStatus {
        loop {
            match std::mem::replace(&mut self.stage, Stage::Finished) {
                Stage::Packing(mut packing) => {
                    if packing.step(&self.marker) == Progress::Yield {
                        self.stage = Stage::Packing(packing);
                        return TaskStatus::Yielded;
                    }

                    let mut records = packing.into_records();
                    let transformed = self.processing_unit.get_mut().transform(&mut records);
                    if let Err(e) = transformed {
                        error!("Accelerator failed on slot {}: {}", self.slot_index, e);
                        self.abort();
                        return TaskStatus::Complete;
                    }
                    self.stage = Stage::Building(self.processing_unit.get().begin_build(records));
                }
                Stage::Building(mut build) => {
                    if build.step() == Progress::Yield {
                        self.stage = Stage::Building(build);
                        return TaskStatus::Yielded;
                    }

                    self.commit(build, now);
                    return TaskStatus::Complete;
                }
                Stage::Finished => return TaskStatus::Complete,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer_state::{
        analysis::DisabledAnalysis,
        gate::PipelineGate,
        marker::RawPoint,
        rendering::{mesh::Mesh, RenderTarget},
    };
    use std::{cell::RefCell, rc::Rc};
    use web_time::Duration;

    struct CountingTarget(Rc<RefCell<usize>>);

    impl RenderTarget for CountingTarget {
        fn commit(&mut self, _mesh: &Mesh) {
            *self.0.borrow_mut() += 1;
        }

        fn set_visible(&mut self, _visible: bool) {}
    }

    fn marker(point_count: usize) -> Marker {
        let points = (0..point_count)
            .map(|i| RawPoint::new(i as f64, 1.0, 2.0))
            .collect();
        Marker::triangle_list(points, Vec::new())
    }

    fn task_for(
        point_count: usize,
        slot: &StResource<RenderSlot>,
        gate: &PipelineGate,
        now: Instant,
    ) -> MeshConversionTask {
        let lease = gate.close(1).unwrap().lease();
        MeshConversionTask::new(
            0,
            marker(point_count),
            slot.clone(),
            StSystem::new(Box::new(MeshProcessingUnit::time_sliced(100, 300))),
            Arc::new(DisabledAnalysis),
            lease,
            now,
        )
    }

    #[test]
    fn test_four_points_commit_on_third_step() {
        let commits = Rc::new(RefCell::new(0));
        let target: Box<dyn RenderTarget> = Box::new(CountingTarget(commits.clone()));
        let slot = StResource::new(RenderSlot::new("0".to_string(), Some(target)));
        let gate = PipelineGate::new(Duration::from_millis(100));
        let now = Instant::now();
        let mut task = task_for(4, &slot, &gate, now);

        assert_eq!(task.resume(now), TaskStatus::Yielded);
        assert_eq!(task.resume(now), TaskStatus::Yielded);
        assert_eq!(*commits.borrow(), 0);
        assert_eq!(task.resume(now), TaskStatus::Complete);

        assert_eq!(*commits.borrow(), 1);
        assert_eq!(slot.get().mesh().vertex_count(), 4);
        assert_eq!(slot.get().mesh().triangle_count(), 1);
        assert!(!gate.refresh(now));
        assert!(gate.refresh(now + Duration::from_millis(100)));
    }

    #[test]
    fn test_missing_target_releases_immediately() {
        let slot = StResource::new(RenderSlot::new("0".to_string(), None));
        let gate = PipelineGate::new(Duration::from_secs(5));
        let now = Instant::now();
        let mut task = task_for(3, &slot, &gate, now);

        while task.resume(now) == TaskStatus::Yielded {}

        assert!(gate.refresh(now));
    }

    #[test]
    fn test_dropped_task_releases_gate() {
        let slot = StResource::new(RenderSlot::new("0".to_string(), None));
        let gate = PipelineGate::new(Duration::from_secs(5));
        let now = Instant::now();
        let mut task = task_for(1000, &slot, &gate, now);

        assert_eq!(task.resume(now), TaskStatus::Yielded);
        drop(task);

        assert!(gate.refresh(now));
    }
}
