use super::after;
use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::TaskError;
use crate::runtime::Scheduler;
use crate::task::{CompletionHandle, Routine, Task};

use std::time::Duration;

/// Bounds how long `task` may take.
///
/// The returned task mirrors `task` if it finishes within `duration`.
/// Otherwise it is canceled with a [`TaskError::Timeout`] reason, whether
/// or not the body cooperates, and `task` is try-cancelled on the next
/// tick of `scheduler`.
///
/// # Examples
///
/// ```rust,ignore
/// let bounded = timeout(&scheduler, &download, Duration::from_secs(2));
/// ```
pub fn timeout<T>(scheduler: &Scheduler, task: &Task<T>, duration: Duration) -> Task<T>
where
    T: Clone + Send + 'static,
{
    let handle = CompletionHandle::new(scheduler);
    let bounded = handle.task();

    let timer = {
        let handle = handle.clone();
        let body = task.clone();
        let scheduler = scheduler.clone();

        after(duration, move || {
            if handle.try_set_canceled_with(TaskError::Timeout) {
                tracing::debug!(task = %body.id(), "task timed out");
                scheduler.post(move || body.try_cancel());
            }
        })
    };

    let watched = task.clone();
    task.core.on_completed_raw(Box::new(move || {
        timer.cancel();
        handle.propagate(&watched);
    }));

    bounded
}

/// Starts a task whose token is cancelled after `duration`.
///
/// Cancellation stays cooperative: the body must check its token.
///
/// # Errors
///
/// Fails if `scheduler` is shutting down.
pub fn run_with_timeout<T, R, F>(
    scheduler: &Scheduler,
    duration: Duration,
    body: F,
) -> Result<Task<T>, TaskError>
where
    T: Send + 'static,
    R: Routine<T>,
    F: FnOnce(CancellationToken) -> R,
{
    Task::run_cancellable(scheduler, CancellationSource::cancel_after(duration), body)
}
