use super::after;
use crate::cancel::CancellationToken;
use crate::error::TaskError;
use crate::runtime::Scheduler;
use crate::task::{CompletionHandle, Step, Task, from_fn};

use std::time::Duration;

/// Creates a task that completes after `duration`.
///
/// The wait is driven by the timer thread, not by ticks; the task still
/// becomes observable to continuations only through `scheduler`.
///
/// # Examples
///
/// ```rust,ignore
/// let wait = delay(&scheduler, Duration::from_millis(10));
/// while !wait.is_completed() {
///     scheduler.tick();
/// }
/// ```
pub fn delay(scheduler: &Scheduler, duration: Duration) -> Task<()> {
    delay_with(scheduler, duration, CancellationToken::none())
}

/// Like [`delay`], but the task is canceled if `token` fires first.
///
/// Faults with [`TaskError::InvalidOperation`] if the timer thread is not
/// running.
pub fn delay_with(scheduler: &Scheduler, duration: Duration, token: CancellationToken) -> Task<()> {
    let handle = CompletionHandle::<()>::new(scheduler);
    let task = handle.task();

    let completer = handle.clone();
    let timer = after(duration, move || {
        completer.try_set_result(());
    });

    // The driver refused the timer; waiting would never end.
    if timer.is_cancelled() {
        handle.try_set_error(TaskError::InvalidOperation("timer thread is not running"));
        return task;
    }

    token.register(move || {
        timer.cancel();
        handle.try_set_canceled();
    });

    task
}

/// Creates a task that yields `frames` times before completing.
///
/// Started on `scheduler` right away. As with any task, the first step
/// runs during the call: zero frames completes at once, otherwise the task
/// becomes terminal on tick `frames + 1`. A failure to start (the
/// scheduler is shutting down) yields a faulted task.
pub fn delay_frames(scheduler: &Scheduler, frames: usize) -> Task<()> {
    let mut remaining = frames;

    let body = from_fn(move |_co| {
        if remaining == 0 {
            return Ok(Step::Done);
        }

        remaining -= 1;
        Ok(Step::Continue)
    });

    Task::run(scheduler, body).unwrap_or_else(|error| Task::from_error(scheduler, error))
}
