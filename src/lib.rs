#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Marker Mesh Visualizer
//!
//! Turns a stream of 3-D triangle-list markers into renderable meshes
//! without stalling the frame loop.
//!
//! Batches arrive from a transport, possibly on another thread, and wait in
//! an unbounded FIFO. Once per frame the visualizer drains at most one batch
//! into its render slots, either time-slicing the conversion on the CPU or
//! offloading the coordinate remap to a `wgpu` compute kernel.
//!
//! ## Key Modules
//!
//! * `application_state` - The headless demo host and its frame loop
//! * `core` - Shared-state containers used throughout the crate
//! * `visualizer_state` - The pipeline: queue, gate, conversion engine and
//!   instrumentation
//!
//! ## Coordinate Convention
//!
//! Source points `(x, y, z)` are displayed at `(x, z, -y)`, on both
//! strategies and with the same `f32` arithmetic.
//!
//! ## Usage
//!
//! ```rust,no_run
//! fn main() {
//!     marker_mesh_visualizer::run();
//! }
//! ```

use std::path::PathBuf;

use log::info;

pub mod application_state;
pub mod core;
pub mod visualizer_state;

pub use crate::core::{MtResource, StResource, StSystem};
pub use application_state::{ApplicationState, LoggingSurface};
pub use visualizer_state::{
    analysis::{DisabledAnalysis, PerformanceAnalysis, PerformanceSink},
    config::{ConfigError, VisualizerConfig},
    gate::{GateLease, PipelineGate},
    marker::{Marker, MarkerBatch, MarkerType, RawColor, RawPoint},
    marker_queue::{MarkerQueue, MarkerSink},
    rendering::{
        mesh::Mesh,
        mesh_processing::{
            Accelerator, AcceleratorError, MeshProcessingUnit, ProcessingStrategy, WgpuAccelerator,
        },
        vertex::VertexRecord,
        RenderSlot, RenderSurface, RenderTarget,
    },
    transport::{LocalTransport, MarkerTransport, TransportError},
    MaybeVisualizer, VisualizerError, VisualizerState,
};

/// Runs the demo: a random marker producer feeding the visualizer for
/// `application_state::DEMO_DURATION`.
///
/// The first command line argument, if any, is the path of a JSON config.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = application_state::load_config(config_path.as_deref());

    let mut state = ApplicationState::new(config);
    state.run_for(application_state::DEMO_DURATION);
    state.shutdown();
}
