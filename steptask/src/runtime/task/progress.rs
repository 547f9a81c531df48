use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type ProgressListener<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Reports how far a task got to whoever listens.
///
/// A `Progress` is a cheap handle: move a clone into the task body and
/// call [`report`](Self::report), keep another one to register listeners.
/// Listeners run synchronously on the reporting thread, in registration
/// order.
///
/// ```rust,ignore
/// let progress = Progress::with_listener(|done: &u32| tracing::info!(done, "loading"));
/// let task = Task::run(&scheduler, load_assets(progress.clone()))?;
/// ```
pub struct Progress<T> {
    listeners: Arc<Mutex<Vec<ProgressListener<T>>>>,
}

impl<T> Clone for Progress<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<T> Default for Progress<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Progress<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A reporter with one listener already registered.
    pub fn with_listener<F>(listener: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let progress = Self::new();
        progress.on_changed(listener);
        progress
    }

    /// Registers a listener called on every [`report`](Self::report).
    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Hands `value` to every listener. Without listeners this does nothing.
    pub fn report(&self, value: T) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(&value);
        }
    }
}

impl<T> fmt::Debug for Progress<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_report_without_listeners_is_noop() {
        Progress::<u8>::new().report(1);
    }

    #[test]
    fn test_listener_may_register_another_listener() {
        let progress = Progress::<u8>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        progress.on_changed({
            let progress = progress.clone();
            let calls = calls.clone();
            move |_| {
                let calls = calls.clone();
                progress.on_changed(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        progress.report(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "Listeners added during a report wait for the next one");

        progress.report(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
