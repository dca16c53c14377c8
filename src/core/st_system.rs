use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

/// A single-threaded container for systems, including trait objects.
///
/// `StSystem` is how the dispatch loop hands the shared `MeshProcessingUnit`
/// to every conversion task it starts. It wraps `Rc<RefCell<Box<T>>>`, so `T`
/// may be unsized (`StSystem<dyn Trait>`).
///
/// # Examples
///
/// ```rust
/// use marker_mesh_visualizer::StSystem;
///
/// let system = StSystem::new(Box::new(42u32));
/// let shared = system.clone();
///
/// **shared.get_mut() = 100;
/// assert_eq!(**system.get(), 100);
/// ```
///
/// # Panics
/// - Panics if a borrow is held while trying to mutably borrow
/// - Panics if a mutable borrow is held while trying to borrow
pub struct StSystem<T: ?Sized> {
    pub system: Rc<RefCell<Box<T>>>,
}

impl<T: ?Sized> StSystem<T> {
    /// Creates a new `StSystem` containing the given boxed system.
    pub fn new(system: Box<T>) -> Self {
        Self {
            system: Rc::new(RefCell::new(system)),
        }
    }

    /// Returns an immutable reference to the contained system.
    pub fn get(&self) -> Ref<'_, Box<T>> {
        self.system.borrow()
    }

    /// Returns a mutable reference to the contained system.
    pub fn get_mut(&self) -> RefMut<'_, Box<T>> {
        self.system.borrow_mut()
    }
}

impl<T: ?Sized> Clone for StSystem<T> {
    fn clone(&self) -> Self {
        Self {
            system: self.system.clone(),
        }
    }
}
