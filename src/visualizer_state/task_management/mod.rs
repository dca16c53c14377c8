//! # Task Management System
//!
//! A single cooperative scheduler for suspendable tasks. The frame loop calls
//! `process_tasks` once per tick; every live task is resumed exactly once per
//! call, in the order the tasks were published. There is no threading here:
//! a task that yields simply waits for the next tick.
//!
//! ## Task Lifecycle
//! 1. Tasks are published via `TaskManager::publish_task()`, which runs them
//!    up to their first yield point right away
//! 2. Tasks still running are parked in FIFO order
//! 3. `process_tasks()` resumes each parked task once per tick
//! 4. Completed tasks are dropped
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut task_manager = TaskManager::new();
//! task_manager.publish_task(Box::new(MyTask::new(...)), now);
//!
//! // In the frame loop:
//! task_manager.process_tasks(now);
//! ```

pub mod task;

use std::collections::VecDeque;

use log::debug;
use task::{Task, TaskStatus};
use web_time::Instant;

/// Resumes suspendable tasks once per scheduler tick.
#[derive(Default)]
pub struct TaskManager {
    running_tasks: VecDeque<Box<dyn Task>>,
    completed_tasks: u64,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a task, running it up to its first yield point.
    ///
    /// # Returns
    /// - `true` if the task yielded and was parked for later ticks
    /// - `false` if it completed within its first step
    pub fn publish_task(&mut self, mut task: Box<dyn Task>, now: Instant) -> bool {
        match task.resume(now) {
            TaskStatus::Yielded => {
                self.running_tasks.push_back(task);
                true
            }
            TaskStatus::Complete => {
                self.completed_tasks += 1;
                false
            }
        }
    }

    /// Resumes every parked task once, in publication order.
    ///
    /// Tasks published while this runs are not resumed until the next call.
    pub fn process_tasks(&mut self, now: Instant) {
        if self.running_tasks.is_empty() {
            return;
        }

        let mut still_running = VecDeque::with_capacity(self.running_tasks.len());
        while let Some(mut task) = self.running_tasks.pop_front() {
            match task.resume(now) {
                TaskStatus::Yielded => still_running.push_back(task),
                TaskStatus::Complete => self.completed_tasks += 1,
            }
        }
        self.running_tasks = still_running;

        debug!(
            "{} task(s) in flight, {} completed so far",
            self.running_tasks.len(),
            self.completed_tasks
        );
    }

    /// Number of tasks waiting to be resumed.
    pub fn tasks_in_flight(&self) -> usize {
        self.running_tasks.len()
    }

    /// Number of tasks that have reported `Complete`.
    pub fn completed_tasks(&self) -> u64 {
        self.completed_tasks
    }

    /// Drops every parked task without resuming it.
    ///
    /// # Returns
    /// The number of tasks dropped
    pub fn drop_all(&mut self) -> usize {
        let dropped = self.running_tasks.len();
        self.running_tasks.clear();
        dropped
    }
}
