//! # Marker Mesh Visualizer Entry Point
//!
//! Calls into the library's `run()` function.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- visualizer.json
//! ```

fn main() {
    marker_mesh_visualizer::run();
}
