use super::Scheduler;

use std::cell::RefCell;

thread_local! {
    /// Scheduler whose tick is executing on this thread.
    ///
    /// Lets step bodies and continuations reach their scheduler without
    /// explicit parameter passing, e.g. through [`spawn`](crate::task::spawn).
    pub(crate) static CURRENT_SCHEDULER: RefCell<Option<Scheduler>> =
        const { RefCell::new(None) };
}

/// Installs `scheduler` as the current scheduler while `f` runs.
///
/// The previous value is restored afterwards, so nested schedulers ticked
/// from inside a body behave.
pub(crate) fn enter_context<R>(scheduler: &Scheduler, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Scheduler>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            let _ = CURRENT_SCHEDULER.try_with(|cell| cell.replace(previous));
        }
    }

    let previous = CURRENT_SCHEDULER.with(|cell| cell.replace(Some(scheduler.clone())));
    let _restore = Restore(previous);

    f()
}

/// The scheduler currently ticking on this thread, if any.
pub(crate) fn current() -> Option<Scheduler> {
    CURRENT_SCHEDULER
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}
