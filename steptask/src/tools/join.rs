use crate::error::{AggregateError, TaskError};
use crate::runtime::Scheduler;
use crate::task::{CompletionHandle, Task, TaskRef};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Bookkeeping shared by the completion callbacks of one join.
struct JoinState {
    remaining: AtomicUsize,
    errors: AggregateError,

    /// Cleared as soon as one merged error was not handled beforehand.
    all_handled: AtomicBool,
    canceled: AtomicBool,
}

impl JoinState {
    fn observe(&self, task: &TaskRef) {
        let Some(error) = task.error() else {
            return;
        };

        if !task.is_faulted() {
            self.canceled.store(true, Ordering::Release);
            return;
        }

        if !error.is_handled() {
            self.all_handled.store(false, Ordering::Release);
        }
        error.mark_handled();
        self.errors.merge(&error);
    }

    fn finish(&self, handle: &CompletionHandle<()>) {
        if !self.errors.is_empty() {
            self.errors.set_handled(self.all_handled.load(Ordering::Acquire));
            handle.try_set_error(TaskError::Aggregate(self.errors.clone()));
        } else if self.canceled.load(Ordering::Acquire) {
            handle.try_set_canceled();
        } else {
            handle.try_set_result(());
        }
    }
}

/// Returns a task completing once every input is terminal.
///
/// - With no inputs the result is already completed.
/// - The errors of every faulted input are merged into one
///   [`AggregateError`]. It counts as handled only if each merged error
///   was handled before the join observed it.
/// - Without faults, one canceled input cancels the join.
///
/// Inputs may have different result types:
///
/// ```rust,ignore
/// let all = join_all(&scheduler, [textures.untyped(), sounds.untyped()]);
/// ```
pub fn join_all<I>(scheduler: &Scheduler, tasks: I) -> Task<()>
where
    I: IntoIterator,
    I::Item: Into<TaskRef>,
{
    let tasks: Vec<TaskRef> = tasks.into_iter().map(Into::into).collect();

    if tasks.is_empty() {
        return Task::completed(scheduler);
    }

    let handle = CompletionHandle::<()>::new(scheduler);
    let joined = handle.task();

    let state = Arc::new(JoinState {
        remaining: AtomicUsize::new(tasks.len()),
        errors: AggregateError::empty(),
        all_handled: AtomicBool::new(true),
        canceled: AtomicBool::new(false),
    });

    for task in tasks {
        let state = state.clone();
        let handle = handle.clone();
        let watched = task.clone();

        task.on_completed(move || {
            state.observe(&watched);

            if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                state.finish(&handle);
            }
        });
    }

    joined
}

/// Like [`join_all`], collecting the values in input order.
///
/// Fails the same way [`join_all`] does.
pub fn join_values<T>(scheduler: &Scheduler, tasks: &[Task<T>]) -> Task<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let all = join_all(scheduler, tasks);
    let tasks = tasks.to_vec();

    all.then(move |()| tasks.iter().map(Task::result).collect())
}
