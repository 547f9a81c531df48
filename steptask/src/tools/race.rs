use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::TaskError;
use crate::runtime::Scheduler;
use crate::task::{CompletionHandle, Task};

use parking_lot::Mutex;
use std::sync::Arc;

fn ensure_not_empty<T>(tasks: &[T]) -> Result<(), TaskError> {
    if tasks.is_empty() {
        return Err(TaskError::InvalidArgument(
            "tasks must contain at least one task",
        ));
    }
    Ok(())
}

/// Returns a task completing with whichever input finishes first.
///
/// The result is the winning task itself, whatever its outcome. Losers are
/// left running; cancelling them is up to the caller (see [`first`]).
///
/// # Errors
///
/// [`TaskError::InvalidArgument`] if `tasks` is empty.
pub fn when_any<T>(scheduler: &Scheduler, tasks: &[Task<T>]) -> Result<Task<Task<T>>, TaskError>
where
    T: Send + 'static,
{
    ensure_not_empty(tasks)?;

    let handle = CompletionHandle::new(scheduler);

    for task in tasks {
        let handle = handle.clone();
        let winner = task.clone();

        task.core.on_completed_raw(Box::new(move || {
            handle.try_set_result(winner);
        }));
    }

    Ok(handle.task())
}

/// Races `tasks` and mirrors the outcome of the first one to finish.
///
/// Exactly one winner is chosen. Once it is, `source` (if any) is
/// cancelled and every other input is try-cancelled. Losers that end up
/// canceled are marked handled. Cancelling `source`
/// before any input finishes cancels the race.
///
/// # Errors
///
/// [`TaskError::InvalidArgument`] if `tasks` is empty.
pub fn first<T>(
    scheduler: &Scheduler,
    tasks: &[Task<T>],
    source: Option<CancellationSource>,
) -> Result<Task<T>, TaskError>
where
    T: Clone + Send + 'static,
{
    ensure_not_empty(tasks)?;

    let handle = CompletionHandle::new(scheduler);
    let race = handle.task();

    // Whoever takes the handle out decides the outcome.
    let slot = Arc::new(Mutex::new(Some(handle)));

    if let Some(source) = &source {
        let slot = slot.clone();
        source.token().register(move || {
            let pending = slot.lock().take();
            if let Some(handle) = pending {
                handle.try_set_canceled();
            }
        });
    }

    let contenders: Arc<Vec<Task<T>>> = Arc::new(tasks.to_vec());

    for task in tasks {
        let slot = slot.clone();
        let source = source.clone();
        let contenders = contenders.clone();
        let winner = task.clone();

        task.core.on_completed_raw(Box::new(move || {
            let pending = slot.lock().take();
            let Some(handle) = pending else {
                return;
            };

            handle.propagate(&winner);

            if let Some(source) = &source {
                source.cancel();
            }

            for loser in contenders.iter().filter(|task| task.id() != winner.id()) {
                loser.try_cancel();

                // The race asked for this cancellation, so it counts as observed.
                let observed = loser.clone();
                loser.core.on_completed_raw(Box::new(move || {
                    if let (true, Some(error)) = (observed.is_canceled(), observed.error()) {
                        error.mark_handled();
                    }
                }));
            }
        }));
    }

    Ok(race)
}

/// Starts every contender with a shared token and races them with
/// [`first`]. The losers see their token cancelled.
///
/// # Examples
///
/// ```rust,ignore
/// let fastest = first_of(&scheduler, [
///     |token| fetch(&scheduler, "primary", token),
///     |token| fetch(&scheduler, "mirror", token),
/// ])?;
/// ```
pub fn first_of<T, I, F>(scheduler: &Scheduler, starters: I) -> Result<Task<T>, TaskError>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce(CancellationToken) -> Task<T>,
{
    let source = CancellationSource::new();
    let tasks: Vec<Task<T>> = starters
        .into_iter()
        .map(|start| start(source.token()))
        .collect();

    first(scheduler, &tasks, Some(source))
}
