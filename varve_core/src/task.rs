// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred work units and the render thread's task queue.
//!
//! A [`Task`] is a boxed closure with its captured arguments, created once
//! and consumed by execution. The [`TaskQueue`] is a strict FIFO guarded by a
//! mutex and condition variable: `enqueue` wakes one blocked consumer,
//! [`run_loop`] pops and executes tasks until stopped, suspending the whole
//! thread while the queue is empty.
//!
//! Stopping takes precedence over pending work: the stop flag is observed at
//! the top of every loop iteration, including when a blocked pop wakes.
//! [`TaskQueue::drain_and_clear`] discards all pending tasks atomically; it
//! is the navigation path's tool for dropping callbacks that reference a
//! document being torn down.
//!
//! A task that panics is not retried. The panic is caught at the execution
//! boundary, reported through the [`Tracer`], and the loop continues with the
//! next task.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Condvar, Mutex};

use crate::trace::{TaskPanicEvent, Tracer};

/// Error returned when enqueueing onto a stopped queue.
///
/// A stopped queue rejects new work rather than accumulating tasks that will
/// never run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("task queue is stopped")]
pub struct QueueClosed;

/// A deferred unit of work: a callable plus its captured arguments.
pub struct Task {
    label: &'static str,
    work: Box<dyn FnOnce() + Send>,
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

impl Task {
    /// Creates a task from a label (used in diagnostics) and a closure.
    #[must_use]
    pub fn new(label: &'static str, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            work: Box::new(work),
        }
    }

    /// Returns the task's diagnostic label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Consumes and executes the task.
    pub fn run(self) {
        (self.work)();
    }
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    stopped: bool,
}

/// An ordered, thread-safe FIFO of [`Task`]s.
///
/// Lives for the life of its render thread. All operations are safe to call
/// from any thread.
#[derive(Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl core::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock().expect("task queue mutex poisoned");
        f.debug_struct("TaskQueue")
            .field("len", &state.tasks.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}

impl TaskQueue {
    /// Creates an empty, running queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task and wakes one blocked consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if [`request_stop`](Self::request_stop) has
    /// been called; the task is dropped.
    pub fn enqueue(&self, task: Task) -> Result<(), QueueClosed> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        if state.stopped {
            return Err(QueueClosed);
        }
        state.tasks.push_back(task);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Pops the next task in FIFO order, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been stopped. The stop flag wins
    /// over pending tasks: a stopped queue returns `None` even if tasks
    /// remain.
    #[must_use]
    pub fn pop(&self) -> Option<Task> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        loop {
            if state.stopped {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            state = self
                .ready
                .wait(state)
                .expect("task queue mutex poisoned");
        }
    }

    /// Removes all pending tasks atomically, returning how many were
    /// discarded.
    ///
    /// Used on navigation so in-flight callbacks against the old document are
    /// dropped rather than executed.
    pub fn drain_and_clear(&self) -> usize {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        let discarded = state.tasks.len();
        state.tasks.clear();
        discarded
    }

    /// Signals the loop to terminate and wakes all blocked consumers.
    pub fn request_stop(&self) {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        state.stopped = true;
        drop(state);
        self.ready.notify_all();
    }

    /// Returns whether the queue has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state
            .lock()
            .expect("task queue mutex poisoned")
            .stopped
    }

    /// Number of tasks currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("task queue mutex poisoned")
            .tasks
            .len()
    }

    /// Returns whether no tasks are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the render thread's loop: pop, execute, repeat until stopped.
///
/// Each task runs to completion before the next is popped. A panicking task
/// is reported to the tracer and does not take the loop down.
pub fn run_loop(queue: &TaskQueue, tracer: &mut Tracer<'_>) {
    while let Some(task) = queue.pop() {
        let label = task.label();
        if catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            tracer.task_panic(&TaskPanicEvent { label });
        }
    }
}
