//! Resumable tasks run by the visualizer's scheduler.
//!
//! # Available Tasks
//! - `MeshConversionTask`: converts one marker into one slot's mesh

pub mod mesh_conversion_task;
