use crate::task::Task;

use parking_lot::Mutex;

/// Wraps `starter` so at most one task it creates runs at a time.
///
/// See [`Distinct`].
pub fn distinct<T, F>(starter: F) -> Distinct<T, F>
where
    T: Send + 'static,
    F: Fn() -> Task<T>,
{
    Distinct::new(starter)
}

/// A single-flight task starter.
///
/// [`start`](Self::start) returns the task still in flight, if any, and
/// only calls the starter again once that task is terminal.
///
/// ```rust,ignore
/// let reload = distinct(move || reload_config(&scheduler));
/// let a = reload.start();
/// let b = reload.start(); // same task as `a` while it runs
/// ```
pub struct Distinct<T, F> {
    starter: F,
    current: Mutex<Option<Task<T>>>,
}

impl<T, F> Distinct<T, F>
where
    T: Send + 'static,
    F: Fn() -> Task<T>,
{
    pub fn new(starter: F) -> Self {
        Self {
            starter,
            current: Mutex::new(None),
        }
    }

    /// Returns the running task, or starts a new one.
    ///
    /// The lock is held while the starter runs, so concurrent callers never
    /// start two tasks. The starter must not call back into this `start`.
    pub fn start(&self) -> Task<T> {
        let mut current = self.current.lock();

        if let Some(task) = current.as_ref().filter(|task| !task.is_completed()) {
            return task.clone();
        }

        let task = (self.starter)();
        *current = Some(task.clone());
        task
    }

    /// The task started last, whether or not it has finished.
    pub fn current(&self) -> Option<Task<T>> {
        self.current.lock().clone()
    }
}
