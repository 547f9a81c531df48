//! Tasks and their building blocks.
//!
//! This module defines:
//! - [`Task`], a stepped computation with a terminal status and an error container,
//! - the step-body contract ([`Routine`], [`Step`], [`Co`]) and the
//!   `async`-based [`coroutine`] adapter,
//! - [`CompletionHandle`], a task completed by assignment instead of stepping,
//! - [`TaskPool`], a bag of fire-and-forget tasks joined later,
//! - [`Progress`], a listener-based progress reporter.

mod continuation;
mod coroutine;
mod handle;
mod progress;
mod set;
mod state;
mod step;

pub(crate) mod core;

pub use self::core::TaskId;
pub use coroutine::{Coroutine, Yield, Yielder, coroutine};
pub use handle::CompletionHandle;
pub use progress::Progress;
pub use set::TaskPool;
pub use state::TaskStatus;
pub use step::{Awaitable, Awaiter, Co, Continuation, FnRoutine, Routine, Step, StepResult, from_fn};

use self::core::{RawTask, StepOutcome, TaskCore};
use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::{AggregateError, TaskError};
use crate::runtime::Scheduler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A resumable unit of work.
///
/// A task is created `Created`, becomes `Running` when started on a
/// [`Scheduler`] (which runs its first step synchronously), and reaches
/// exactly one terminal status exactly once. `Task` is a cheap handle;
/// clones refer to the same task.
///
/// A `Task` exposes no way to force its completion. Only the body, or the
/// owner of a [`CompletionHandle`], decides the outcome.
pub struct Task<T = ()> {
    pub(crate) core: Arc<TaskCore<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Creates a task in the `Created` state. Nothing runs until
    /// [`start`](Self::start).
    pub fn new<R>(routine: R) -> Self
    where
        R: Routine<T>,
    {
        Self {
            core: Arc::new(TaskCore::new(Some(Box::new(routine)), TaskStatus::Created)),
        }
    }

    /// Attaches a cancellation source. Returns `self` for chaining.
    pub fn with_cancellation(self, source: CancellationSource) -> Self {
        self.core.set_cancellation(source);
        self
    }

    /// Creates and starts a task on `scheduler`.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler is shutting down.
    pub fn run<R>(scheduler: &Scheduler, routine: R) -> Result<Self, TaskError>
    where
        R: Routine<T>,
    {
        let task = Self::new(routine);
        task.start(scheduler)?;
        Ok(task)
    }

    /// Creates and starts a task whose body receives the token of `source`.
    ///
    /// The source is attached to the task, so [`cancel`](Self::cancel)
    /// works on the result.
    pub fn run_cancellable<R, F>(
        scheduler: &Scheduler,
        source: CancellationSource,
        body: F,
    ) -> Result<Self, TaskError>
    where
        R: Routine<T>,
        F: FnOnce(CancellationToken) -> R,
    {
        let task = Self::new(body(source.token())).with_cancellation(source);
        task.start(scheduler)?;
        Ok(task)
    }

    /// Starts the task on `scheduler`.
    ///
    /// The first step runs synchronously, so a body that finishes at once
    /// is terminal before this returns. A yielded first step is handed to
    /// the scheduler on its next tick.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidOperation`] if the task is not `Created`.
    /// - [`TaskError::InvalidOperation`] if the scheduler is shutting down.
    pub fn start(&self, scheduler: &Scheduler) -> Result<(), TaskError> {
        scheduler.ensure_accepting()?;
        self.core.begin(scheduler)?;

        match self.core.run_once() {
            StepOutcome::Finished => {
                scheduler.track_completed(self.untyped());
                Ok(())
            }
            _ => scheduler.queue_task(self.untyped()),
        }
    }

    /// A task that already ran to completion with `value`.
    pub fn from_result(scheduler: &Scheduler, value: T) -> Self {
        let core = TaskCore::new(None, TaskStatus::Running);
        core.bind(scheduler);
        core.complete_with_result(value);
        Self {
            core: Arc::new(core),
        }
    }

    /// A unit-like task that already ran to completion.
    pub fn completed(scheduler: &Scheduler) -> Self {
        let core = TaskCore::new(None, TaskStatus::Running);
        core.bind(scheduler);
        core.complete_empty();
        Self {
            core: Arc::new(core),
        }
    }

    /// A task that already faulted with `error`.
    ///
    /// The error still goes through the scheduler's unhandled-error sweep.
    pub fn from_error(scheduler: &Scheduler, error: TaskError) -> Self {
        let core = TaskCore::new(None, TaskStatus::Running);
        core.bind(scheduler);
        core.complete_with_error(error);
        let task = Self {
            core: Arc::new(core),
        };
        scheduler.track_completed(task.untyped());
        task
    }

    /// A task that is already canceled.
    pub fn canceled(scheduler: &Scheduler) -> Self {
        let core = TaskCore::new(None, TaskStatus::Running);
        core.bind(scheduler);
        core.complete_with_error(TaskError::canceled());
        let task = Self {
            core: Arc::new(core),
        };
        scheduler.track_completed(task.untyped());
        task
    }

    pub fn id(&self) -> TaskId {
        self.core.id()
    }

    pub fn status(&self) -> TaskStatus {
        self.core.status()
    }

    /// Terminal, whatever the outcome.
    pub fn is_completed(&self) -> bool {
        self.core.is_completed()
    }

    pub fn is_faulted(&self) -> bool {
        self.status() == TaskStatus::Faulted
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == TaskStatus::Canceled
    }

    /// The recorded errors, if any.
    pub fn error(&self) -> Option<AggregateError> {
        self.core.error()
    }

    /// Reads the value of a terminal task.
    ///
    /// # Errors
    ///
    /// - the stored [`AggregateError`] if the task faulted or was canceled,
    /// - [`TaskError::InvalidOperation`] if the task is not terminal yet.
    pub fn result(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        self.core.result()
    }

    /// `Ok(())` if the task ran to completion, its error otherwise.
    pub fn check(&self) -> Result<(), TaskError> {
        match self.status() {
            TaskStatus::RanToCompletion => Ok(()),
            TaskStatus::Faulted | TaskStatus::Canceled => Err(self
                .error()
                .map(TaskError::Aggregate)
                .unwrap_or_else(TaskError::canceled)),
            _ => Err(TaskError::InvalidOperation("task has not completed yet")),
        }
    }

    pub fn cancellation(&self) -> Option<CancellationSource> {
        self.core.cancellation()
    }

    /// The scheduler the task was started on.
    pub fn scheduler(&self) -> Option<Scheduler> {
        self.core.scheduler()
    }

    /// Requests cancellation and forces one step.
    ///
    /// The body only reacts if it checks its token. On a terminal task this
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidOperation`] if no cancellation source is attached.
    pub fn cancel(&self) -> Result<(), TaskError> {
        if self.core.request_cancel(None) {
            Ok(())
        } else {
            Err(TaskError::InvalidOperation("task has no cancellation source"))
        }
    }

    /// Like [`cancel`](Self::cancel), recording `reason` on the source.
    pub fn cancel_with(&self, reason: TaskError) -> Result<(), TaskError> {
        if self.core.request_cancel(Some(reason)) {
            Ok(())
        } else {
            Err(TaskError::InvalidOperation("task has no cancellation source"))
        }
    }

    /// Like [`cancel`](Self::cancel), but a no-op without a source.
    pub fn try_cancel(&self) {
        self.core.request_cancel(None);
    }

    /// Cancels the task with a [`TaskError::Timeout`] reason after `timeout`.
    ///
    /// The request is posted to the task's scheduler, so the forced step
    /// runs on a tick rather than on the timer thread.
    pub fn cancel_after(&self, timeout: Duration) {
        let task = self.clone();
        let timer = crate::time::after(timeout, move || {
            let scheduler = task.scheduler().unwrap_or_else(Scheduler::fallback);
            scheduler.post(move || {
                task.core.request_cancel(Some(TaskError::Timeout));
            });
        });

        self.core.on_completed_raw(Box::new(move || timer.cancel()));
    }

    /// A type-erased handle to this task.
    pub fn untyped(&self) -> TaskRef {
        TaskRef {
            raw: self.core.clone(),
        }
    }
}

impl<T: Send + 'static> Awaiter for Task<T> {
    fn is_completed(&self) -> bool {
        self.core.is_completed()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.core.on_completed_raw(continuation)
    }
}

impl<T: Send + 'static> From<&Task<T>> for Awaitable {
    fn from(task: &Task<T>) -> Self {
        Awaitable::from_arc(task.core.clone())
    }
}

impl<T: Send + 'static> From<Task<T>> for Awaitable {
    fn from(task: Task<T>) -> Self {
        Awaitable::from_arc(task.core)
    }
}

impl<T: Send + 'static> From<&Task<T>> for TaskRef {
    fn from(task: &Task<T>) -> Self {
        task.untyped()
    }
}

impl<T: Send + 'static> From<Task<T>> for TaskRef {
    fn from(task: Task<T>) -> Self {
        TaskRef { raw: task.core }
    }
}

impl<T: Send + 'static> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// A type-erased task handle.
///
/// Used wherever tasks of different result types are mixed: scheduler
/// diagnostics, [`join_all`](crate::tools::join_all), [`TaskPool`].
#[derive(Clone)]
pub struct TaskRef {
    pub(crate) raw: Arc<dyn RawTask>,
}

impl TaskRef {
    pub fn id(&self) -> TaskId {
        self.raw.id()
    }

    pub fn status(&self) -> TaskStatus {
        self.raw.status()
    }

    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_faulted(&self) -> bool {
        self.status() == TaskStatus::Faulted
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == TaskStatus::Canceled
    }

    pub fn error(&self) -> Option<AggregateError> {
        self.raw.error()
    }

    /// See [`Task::try_cancel`].
    pub fn try_cancel(&self) {
        self.raw.try_cancel()
    }

    /// Registers a continuation; it is posted to the owning scheduler.
    pub fn on_completed<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.raw.on_completed(Box::new(continuation))
    }

    pub(crate) fn step(&self) -> StepOutcome {
        self.raw.step()
    }

    pub(crate) fn fault(&self, error: TaskError) {
        self.raw.fault(error)
    }
}

impl Awaiter for TaskRef {
    fn is_completed(&self) -> bool {
        TaskRef::is_completed(self)
    }

    fn on_completed(&self, continuation: Continuation) {
        self.raw.on_completed(continuation)
    }
}

impl From<&TaskRef> for Awaitable {
    fn from(task: &TaskRef) -> Self {
        Awaitable::new(task.clone())
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TaskRef {}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Starts `routine` on the scheduler currently ticking on this thread,
/// or on the process-wide default scheduler outside a tick.
///
/// # Errors
///
/// Fails if that scheduler is shutting down.
pub fn spawn<T, R>(routine: R) -> Result<Task<T>, TaskError>
where
    T: Send + 'static,
    R: Routine<T>,
{
    Task::run(&Scheduler::fallback(), routine)
}
