use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` backs the state that crosses the transport boundary: the marker
/// queue (pushed from the transport thread, drained on the frame loop) and the
/// keyed performance recorder. It uses an `Arc<RwLock<T>>` internally.
///
/// # Examples
///
/// ```
/// # use std::thread;
/// use marker_mesh_visualizer::MtResource;
///
/// let pending = MtResource::new(0usize);
/// let producer = pending.clone();
///
/// let handle = thread::spawn(move || {
///     *producer.get_mut() += 1;
/// });
///
/// handle.join().unwrap();
/// assert_eq!(*pending.get(), 1);
/// ```
///
/// # Panics
/// `get` and `get_mut` panic if the lock is poisoned, i.e. another holder
/// panicked while writing.
pub struct MtResource<T: Send + Sync> {
    pub resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
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

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
