use super::core::TaskCore;
use super::{Task, TaskStatus};
use crate::cancel::CancellationToken;
use crate::error::TaskError;
use crate::runtime::Scheduler;

use std::sync::Arc;

/// Completion capability over a task's core.
///
/// Only [`CompletionHandle`] and the crate's combinators hold one; the
/// public [`Task`] surface never exposes it.
pub(crate) trait Completer<T> {
    fn try_set_result(&self, value: T) -> bool;
    fn try_set_error(&self, error: TaskError) -> bool;
    fn try_set_canceled(&self, reason: Option<TaskError>) -> bool;
}

impl<T: Send + 'static> Completer<T> for TaskCore<T> {
    fn try_set_result(&self, value: T) -> bool {
        self.complete_with_result(value)
    }

    fn try_set_error(&self, error: TaskError) -> bool {
        self.complete_with_error(error)
    }

    fn try_set_canceled(&self, reason: Option<TaskError>) -> bool {
        let error = match reason {
            Some(reason) => TaskError::canceled_with(reason),
            None => TaskError::canceled(),
        };
        self.complete_with_error(error)
    }
}

/// A task completed by assignment rather than by stepping.
///
/// The handle's task starts `Running` and is registered with the scheduler
/// so its error can be swept for unhandled failures. It is never stepped.
///
/// Cloning the handle shares the completion right; whichever clone sets
/// the outcome first wins.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = CompletionHandle::new(&scheduler);
/// let task = handle.task();
///
/// handle.set_result(7)?;
/// scheduler.tick();
///
/// assert_eq!(task.result()?, 7);
/// ```
pub struct CompletionHandle<T> {
    task: Task<T>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
        }
    }
}

impl<T: Send + 'static> CompletionHandle<T> {
    /// Creates a handle whose task is tracked by `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        let core = TaskCore::new(None, TaskStatus::Running);
        core.bind(scheduler);

        let task = Task {
            core: Arc::new(core),
        };
        scheduler.track_pending(task.untyped());

        Self { task }
    }

    /// The task completed through this handle.
    pub fn task(&self) -> Task<T> {
        self.task.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.task.is_completed()
    }

    /// Completes with `value`. Returns `false` if already completed.
    pub fn try_set_result(&self, value: T) -> bool {
        self.task.core.try_set_result(value)
    }

    /// Completes with `value`.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidOperation`] if already completed.
    pub fn set_result(&self, value: T) -> Result<(), TaskError> {
        ensure(self.try_set_result(value))
    }

    /// Faults the task with `error`. Returns `false` if already completed.
    ///
    /// A cancellation-kind error cancels instead of faulting.
    pub fn try_set_error(&self, error: TaskError) -> bool {
        self.task.core.try_set_error(error)
    }

    pub fn set_error(&self, error: TaskError) -> Result<(), TaskError> {
        ensure(self.try_set_error(error))
    }

    pub fn try_set_canceled(&self) -> bool {
        self.task.core.try_set_canceled(None)
    }

    pub fn set_canceled(&self) -> Result<(), TaskError> {
        ensure(self.try_set_canceled())
    }

    /// Cancels with `reason` recorded inside the cancellation error.
    pub fn try_set_canceled_with(&self, reason: TaskError) -> bool {
        self.task.core.try_set_canceled(Some(reason))
    }

    /// Copies the outcome of a terminal `other` into this handle.
    ///
    /// Value, error aggregate (shared, not copied) or cancellation carry
    /// over. Returns `false` if this handle was already completed or
    /// `other` is not terminal.
    pub fn propagate(&self, other: &Task<T>) -> bool
    where
        T: Clone,
    {
        self.task.core.complete_from(&other.core)
    }

    /// Cancels the task when `token` is cancelled, unless it completed first.
    pub fn with_cancellation(self, token: &CancellationToken) -> Self {
        let handle = self.clone();
        token.register(move || {
            handle.try_set_canceled();
        });
        self
    }
}

fn ensure(completed: bool) -> Result<(), TaskError> {
    if completed {
        Ok(())
    } else {
        Err(TaskError::InvalidOperation("the task has already completed"))
    }
}
