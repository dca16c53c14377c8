//! # Task System Core Traits
//!
//! A `Task` is a suspendable unit of work driven by the cooperative
//! `TaskManager`. Each call to `resume` runs the task until its next yield
//! point and reports whether it wants to be resumed again.
//!
//! ## Task Lifecycle
//! 1. A task is handed to `TaskManager::publish_task()`
//! 2. It is resumed once immediately, up to its first yield point
//! 3. It is resumed once per scheduler tick until it reports `Complete`
//! 4. The manager drops it; any cleanup belongs in the task's `Drop`
//!
//! Tasks never run concurrently with each other or with the dispatch loop,
//! so they may share single-threaded state.

use web_time::Instant;

/// What a task reports after running to its next yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task gave control back and wants to be resumed on a later tick
    Yielded,
    /// The task has finished and can be dropped
    Complete,
}

/// A suspendable unit of work with explicit yield points.
///
/// # Implementation Guidelines
/// - Keep the work between two yield points bounded; it runs inside a frame
/// - Own all the data the task needs, or hold shared single-threaded handles
/// - Put obligations that must hold on every exit path in `Drop`, since a task
///   may be dropped without ever reporting `Complete`
pub trait Task {
    /// Runs the task until its next yield point.
    ///
    /// `now` is the scheduler tick's timestamp, used for anything the task
    /// schedules relative to its own completion.
    fn resume(&mut self, now: Instant) -> TaskStatus;
}
