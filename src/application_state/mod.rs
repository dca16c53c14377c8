//! # Application State Management
//!
//! The headless host of the demo binary. It owns the visualizer, a producer
//! feeding it through a `LocalTransport`, and a fixed-interval frame loop
//! standing in for a render loop. Commits land on a `LoggingSurface`, which
//! only reports what it would display.

pub mod demo_source;

use std::{path::Path, thread};

use demo_source::DemoProducer;
use log::{error, info};
use web_time::{Duration, Instant};

use crate::visualizer_state::{
    config::VisualizerConfig,
    rendering::{mesh::Mesh, RenderSurface, RenderTarget},
    transport::LocalTransport,
    MaybeVisualizer,
};

/// Interval between two scheduler ticks.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Interval between two published batches.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(250);
/// How long the demo runs.
pub const DEMO_DURATION: Duration = Duration::from_secs(10);

/// Render target that logs every mesh it is given.
pub struct LoggingTarget {
    name: String,
    commits: usize,
}

impl RenderTarget for LoggingTarget {
    fn commit(&mut self, mesh: &Mesh) {
        self.commits += 1;
        let center = mesh.bounds.center();
        info!(
            "{}: commit #{} with {} vertices, {} triangles, centered at ({:.2}, {:.2}, {:.2})",
            self.name,
            self.commits,
            mesh.vertex_count(),
            mesh.triangle_count(),
            center.x,
            center.y,
            center.z
        );
    }

    fn set_visible(&mut self, visible: bool) {
        info!("{}: visible = {}", self.name, visible);
    }
}

/// Surface handing out `LoggingTarget`s.
#[derive(Default)]
pub struct LoggingSurface;

impl RenderSurface for LoggingSurface {
    fn create_target(&mut self, parent: &str, name: &str) -> Option<Box<dyn RenderTarget>> {
        Some(Box::new(LoggingTarget {
            name: format!("{}/{}", parent, name),
            commits: 0,
        }))
    }
}

/// The demo's running state.
pub struct ApplicationState {
    /// The pipeline, inert if it failed to start
    pub visualizer: MaybeVisualizer,
    /// Feeds random batches into the transport
    pub producer: Option<DemoProducer>,
    /// Timestamp of the last tick
    pub last_tick_time: Instant,
}

impl ApplicationState {
    /// Starts the visualizer and, if it is running, the producer.
    pub fn new(config: VisualizerConfig) -> Self {
        let transport = LocalTransport::new();
        let topic = config.topic_name.clone();
        let marker_count = config.slot_count + 1;

        let mut surface = LoggingSurface;
        let visualizer = MaybeVisualizer::start(config, Box::new(transport.clone()), &mut surface);

        let producer = visualizer
            .is_running()
            .then(|| DemoProducer::spawn(transport, topic, marker_count, PUBLISH_INTERVAL));

        ApplicationState {
            visualizer,
            producer,
            last_tick_time: Instant::now(),
        }
    }

    /// Ticks the visualizer at `FRAME_INTERVAL` until `duration` has passed.
    pub fn run_for(&mut self, duration: Duration) {
        if !self.visualizer.is_running() {
            error!("Visualizer is inert, nothing to run.");
            return;
        }

        let start = Instant::now();
        while start.elapsed() < duration {
            let now = Instant::now();
            self.visualizer.tick(now);
            self.last_tick_time = now;

            let frame_time = now.elapsed();
            if frame_time < FRAME_INTERVAL {
                thread::sleep(FRAME_INTERVAL - frame_time);
            }
        }
    }

    /// Stops the producer, then the visualizer.
    pub fn shutdown(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        self.visualizer.shutdown();
    }
}

/// Loads the config at `path`, or the defaults when no path is given.
///
/// A config that fails to load is logged and replaced by the defaults.
pub fn load_config(path: Option<&Path>) -> VisualizerConfig {
    let Some(path) = path else {
        info!("No config file given, using defaults.");
        return VisualizerConfig::default();
    };

    match VisualizerConfig::load(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            error!("{}; falling back to defaults.", e);
            VisualizerConfig::default()
        }
    }
}
