use crate::error::{TaskError, panic_message};
use crate::runtime::Scheduler;
use crate::task::{CompletionHandle, Task, TaskStatus};
use crate::time::delay;

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

/// Starts a task and restarts it on failure, up to `retry_count` times.
///
/// The first successful attempt completes the result. If every attempt
/// fails, the result carries the last attempt's [`AggregateError`] itself;
/// earlier failures are marked handled.
///
/// [`AggregateError`]: crate::error::AggregateError
///
/// # Examples
///
/// ```rust,ignore
/// let fetched = retry(&scheduler, 3, || fetch(&scheduler, "config.json"));
/// ```
pub fn retry<T, F>(scheduler: &Scheduler, retry_count: usize, starter: F) -> Task<T>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Task<T> + Send + 'static,
{
    Retry::new(retry_count, starter).start(scheduler)
}

/// Configurable form of [`retry`].
///
/// ```rust,ignore
/// let fetched = Retry::new(3, || fetch(&scheduler, "config.json"))
///     .interval(Duration::from_millis(200))
///     .start(&scheduler);
/// ```
pub struct Retry<F> {
    starter: F,
    remaining: usize,
    interval: Duration,
}

impl<F> Retry<F> {
    pub fn new(retry_count: usize, starter: F) -> Self {
        Self {
            starter,
            remaining: retry_count,
            interval: Duration::ZERO,
        }
    }

    /// Waits `interval` before each new attempt.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts the first attempt and returns the overall task.
    pub fn start<T>(self, scheduler: &Scheduler) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> Task<T> + Send + 'static,
    {
        let handle = CompletionHandle::new(scheduler);
        let task = handle.task();

        attempt(Arc::new(Mutex::new(self)), scheduler.clone(), handle);
        task
    }
}

fn attempt<T, F>(state: Arc<Mutex<Retry<F>>>, scheduler: Scheduler, handle: CompletionHandle<T>)
where
    T: Clone + Send + 'static,
    F: FnMut() -> Task<T> + Send + 'static,
{
    let started = {
        let mut retry = state.lock();
        catch_unwind(AssertUnwindSafe(|| (retry.starter)()))
    };

    let task = started.unwrap_or_else(|payload| {
        Task::from_error(&scheduler, TaskError::Panicked(panic_message(payload)))
    });

    let watched = task.clone();
    task.core.on_completed_raw(Box::new(move || {
        if watched.status() == TaskStatus::RanToCompletion {
            handle.propagate(&watched);
            return;
        }

        let interval = {
            let mut retry = state.lock();
            if retry.remaining == 0 {
                None
            } else {
                retry.remaining -= 1;
                Some(retry.interval)
            }
        };

        let Some(interval) = interval else {
            handle.propagate(&watched);
            return;
        };

        if let Some(error) = watched.error() {
            error.mark_handled();
            tracing::debug!(task = %watched.id(), %error, "attempt failed, retrying");
        }

        if interval.is_zero() {
            attempt(state, scheduler, handle);
            return;
        }

        let wait = delay(&scheduler, interval);
        wait.core.on_completed_raw(Box::new(move || attempt(state, scheduler, handle)));
    }));
}
