//! Rendering side of the pipeline.
//!
//! The windowing and rendering surface is an external collaborator. The
//! pipeline only needs two things from it: a way to create one target per
//! slot at startup (`RenderSurface`), and per-target calls to replace the
//! displayed mesh and toggle visibility (`RenderTarget`).
//!
//! # Architecture
//! - `RenderSlot`: persistent destination owning a `Mesh` and a target handle
//! - `mesh`: the destination mesh object with normals and bounds
//! - `vertex`: packed vertex records and the parallel vertex buffer
//! - `mesh_processing`: the triangulate + transform engine

pub mod mesh;
pub mod mesh_processing;
pub mod vertex;

use log::debug;

use mesh::Mesh;

/// A render destination that displays one mesh.
pub trait RenderTarget {
    /// Replaces the displayed mesh.
    fn commit(&mut self, mesh: &Mesh);

    /// Shows or hides the target.
    fn set_visible(&mut self, visible: bool);
}

/// Factory for render targets, called once per slot at startup.
pub trait RenderSurface {
    /// Creates a target called `name` under the parent called `parent`.
    ///
    /// Returns `None` if the surface cannot provide one; the slot then runs
    /// without a target and every conversion for it reports an error.
    fn create_target(&mut self, parent: &str, name: &str) -> Option<Box<dyn RenderTarget>>;
}

/// Name of slot `index` when there are `slot_count` slots: the index
/// zero-padded to the digit width of `slot_count`.
pub fn slot_name(index: usize, slot_count: usize) -> String {
    let width = slot_count.to_string().len();
    format!("{:0width$}", index, width = width)
}

/// A persistent render destination reused for every batch.
///
/// Created once at startup and never destroyed before shutdown. Between
/// conversions the slot's mesh keeps the last committed geometry, also while
/// the slot is hidden.
pub struct RenderSlot {
    name: String,
    mesh: Mesh,
    target: Option<Box<dyn RenderTarget>>,
    visible: bool,
}

impl RenderSlot {
    pub fn new(name: String, target: Option<Box<dyn RenderTarget>>) -> Self {
        RenderSlot {
            name,
            mesh: Mesh::new(),
            target,
            visible: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Shows or hides the slot, forwarding to the target when there is one.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if let Some(target) = self.target.as_mut() {
            target.set_visible(visible);
        }
    }

    /// Removes the target handle, as when the target is destroyed externally.
    pub fn detach_target(&mut self) -> Option<Box<dyn RenderTarget>> {
        debug!("Render target of slot {} detached.", self.name);
        self.target.take()
    }

    /// Splits the slot into its mesh and its target for a commit.
    pub fn mesh_and_target(&mut self) -> (&mut Mesh, Option<&mut Box<dyn RenderTarget>>) {
        (&mut self.mesh, self.target.as_mut())
    }
}
