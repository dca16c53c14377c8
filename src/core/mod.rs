//! # Core Module
//!
//! Shared-ownership containers used throughout the visualizer. The pipeline runs
//! on a single cooperative scheduler, so most state lives in single-threaded
//! containers; the marker queue and the performance recorder are the exceptions
//! because the transport may push from its own thread.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking
//! - `StResource`: Single-threaded reference-counted resource with interior mutability
//! - `StSystem`: Single-threaded container for (possibly unsized) systems
//!
//! ## Usage
//! ```rust
//! use marker_mesh_visualizer::{MtResource, StResource};
//!
//! let queue = MtResource::new(Vec::<u32>::new());
//! queue.get_mut().push(1);
//! assert_eq!(queue.get().len(), 1);
//!
//! let slot = StResource::new(0u32);
//! *slot.get_mut() += 1;
//! assert_eq!(*slot.get(), 1);
//! ```

pub mod mt_resource;
pub mod st_resource;
pub mod st_system;

pub use mt_resource::MtResource;
pub use st_resource::StResource;
pub use st_system::StSystem;
