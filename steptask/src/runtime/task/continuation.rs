use super::{CompletionHandle, Routine, Task, TaskStatus};
use crate::error::{AggregateError, TaskError, panic_message};
use crate::runtime::Scheduler;

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs `f`, turning a panic into [`TaskError::Panicked`].
fn guarded<R>(f: impl FnOnce() -> Result<R, TaskError>) -> Result<R, TaskError> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))))
}

impl<T: Send + 'static> Task<T> {
    fn continuation_scheduler(&self) -> Scheduler {
        self.scheduler().unwrap_or_else(Scheduler::fallback)
    }

    /// Runs `f` once this task is terminal and returns a task for its result.
    ///
    /// `f` runs from the scheduler's post queue, never inline. If this task
    /// was canceled, `f` is skipped and the continuation is canceled too.
    /// An error or panic from `f` faults the continuation.
    pub fn continue_with<U, F>(&self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(&Task<T>) -> Result<U, TaskError> + Send + 'static,
    {
        let handle = CompletionHandle::new(&self.continuation_scheduler());
        let continuation = handle.task();
        let antecedent = self.clone();

        self.core.on_completed_raw(Box::new(move || {
            if antecedent.is_canceled() {
                match antecedent.check() {
                    Err(error) => handle.try_set_error(error),
                    Ok(()) => handle.try_set_canceled(),
                };
                return;
            }

            match guarded(|| f(&antecedent)) {
                Ok(value) => handle.try_set_result(value),
                Err(error) => handle.try_set_error(error),
            };
        }));

        continuation
    }

    /// Starts another task once this one is terminal.
    ///
    /// The returned task mirrors the started task's outcome.
    pub fn continue_with_task<U, F>(&self, starter: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&Task<T>) -> Result<Task<U>, TaskError> + Send + 'static,
    {
        let handle = CompletionHandle::new(&self.continuation_scheduler());
        let continuation = handle.task();
        let antecedent = self.clone();

        self.core.on_completed_raw(Box::new(move || {
            match guarded(|| starter(&antecedent)) {
                Ok(inner) => {
                    let watched = inner.clone();
                    inner.core.on_completed_raw(Box::new(move || {
                        handle.propagate(&watched);
                    }));
                }
                Err(error) => {
                    handle.try_set_error(error);
                }
            }
        }));

        continuation
    }

    /// Runs a step body as a new task once this one is terminal.
    pub fn continue_with_routine<U, R, F>(&self, body: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        R: Routine<U>,
        F: FnOnce(&Task<T>) -> R + Send + 'static,
    {
        let scheduler = self.continuation_scheduler();
        self.continue_with_task(move |antecedent| Task::run(&scheduler, body(antecedent)))
    }

    /// Maps the value of a successful task.
    ///
    /// If this task faults, `f` is skipped and the continuation faults
    /// with the very same [`AggregateError`].
    pub fn then<U, F>(&self, f: F) -> Task<U>
    where
        T: Clone,
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, TaskError> + Send + 'static,
    {
        self.continue_with(move |antecedent| f(antecedent.result()?))
    }

    /// Starts another task with the value of a successful task.
    pub fn then_task<U, F>(&self, starter: F) -> Task<U>
    where
        T: Clone,
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Task<U>, TaskError> + Send + 'static,
    {
        self.continue_with_task(move |antecedent| starter(antecedent.result()?))
    }

    /// Observes the value of a successful task. Returns this task.
    pub fn on_success<F>(&self, f: F) -> Task<T>
    where
        T: Clone,
        F: FnOnce(T) + Send + 'static,
    {
        self.continue_with(move |antecedent| {
            if antecedent.status() == TaskStatus::RanToCompletion {
                f(antecedent.result()?);
            }
            Ok(())
        });

        self.clone()
    }

    /// Observes the errors of a faulted task and marks them handled.
    /// Returns this task.
    pub fn on_error<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(&AggregateError) + Send + 'static,
    {
        self.continue_with(move |antecedent| {
            if let (TaskStatus::Faulted, Some(error)) = (antecedent.status(), antecedent.error()) {
                error.mark_handled();
                f(&error);
            }
            Ok(())
        });

        self.clone()
    }
}
