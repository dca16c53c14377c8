use std::{
    rc::Rc,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A single-threaded, reference-counted resource with interior mutability.
///
/// Render slots and the pipeline gate are shared between the dispatch loop
/// and the conversion tasks it spawns. Everything runs on the frame loop's
/// thread, so `Rc` is enough; the `RwLock` gives the guard-based access the
/// rest of the crate uses.
///
/// # Examples
///
/// ```
/// use marker_mesh_visualizer::StResource;
///
/// let slot = StResource::new(vec![0u32, 1, 2]);
/// let task_handle = slot.clone();
///
/// task_handle.get_mut().push(3);
/// assert_eq!(slot.get().len(), 4);
/// ```
///
/// # Panics
/// - Panics if a write guard is requested while any guard is alive on the same thread
/// - Panics if the lock is poisoned
pub struct StResource<T> {
    pub resource: Rc<RwLock<T>>,
}

impl<T> StResource<T> {
    /// Creates a new `StResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Rc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard over the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a write guard over the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }
}

impl<T> Clone for StResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
