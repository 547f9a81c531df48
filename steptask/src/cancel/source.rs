use super::token::CancellationToken;
use crate::error::TaskError;
use crate::time;

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub(crate) type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct SignalState {
    reason: Option<TaskError>,
    callbacks: Vec<CancelCallback>,

    /// Linked sources, held weakly. Dropped or already cancelled ones are
    /// pruned whenever a new link is added.
    children: Vec<Weak<Signal>>,
}

/// State shared by a source and all tokens handed out from it.
#[derive(Default)]
pub(crate) struct Signal {
    /// Mirrors "cancel has happened"; written only under `state`.
    requested: AtomicBool,
    state: Mutex<SignalState>,
}

impl Signal {
    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn reason(&self) -> Option<TaskError> {
        self.state.lock().reason.clone()
    }

    /// Registers `callback`, or runs it right away if already requested.
    pub(crate) fn register(&self, callback: CancelCallback) {
        {
            let mut state = self.state.lock();
            if !self.is_requested() {
                state.callbacks.push(callback);
                return;
            }
        }

        callback();
    }

    /// Cancels `child` whenever this signal is cancelled, forwarding the
    /// reason.
    fn link(&self, child: &Arc<Signal>) {
        {
            let mut state = self.state.lock();
            if !self.is_requested() {
                state
                    .children
                    .retain(|link| link.upgrade().is_some_and(|linked| !linked.is_requested()));
                state.children.push(Arc::downgrade(child));
                return;
            }
        }

        child.cancel(self.reason());
    }

    /// Requests cancellation. Only the first call has any effect.
    fn cancel(&self, reason: Option<TaskError>) -> bool {
        let (callbacks, children) = {
            let mut state = self.state.lock();
            if self.is_requested() {
                return false;
            }

            self.requested.store(true, Ordering::Release);
            state.reason = reason.clone();
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.children),
            )
        };

        for callback in callbacks {
            callback();
        }

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }

        true
    }
}

/// The owning side of a cancellation signal.
///
/// A source hands out any number of [`CancellationToken`]s. Requesting
/// cancellation is idempotent: the flag is set once, the reason recorded
/// by the first call is kept, and registered callbacks fire exactly once
/// in registration order.
///
/// Cloning a source yields another handle to the same signal.
#[derive(Clone, Default)]
pub struct CancellationSource {
    signal: Arc<Signal>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken::from_signal(self.signal.clone())
    }

    pub fn is_requested(&self) -> bool {
        self.signal.is_requested()
    }

    /// The reason given to the first [`cancel_with`](Self::cancel_with), if any.
    pub fn reason(&self) -> Option<TaskError> {
        self.signal.reason()
    }

    /// Requests cancellation without a reason.
    pub fn cancel(&self) {
        if self.signal.cancel(None) {
            tracing::trace!("cancellation requested");
        }
    }

    /// Requests cancellation, recording `reason`.
    ///
    /// The reason is surfaced by [`CancellationToken::throw_if_requested`].
    pub fn cancel_with(&self, reason: TaskError) {
        if self.signal.cancel(Some(reason)) {
            tracing::trace!("cancellation requested with a reason");
        }
    }

    /// Creates a source that is cancelled whenever `token` is.
    ///
    /// The link is one-way: cancelling the returned source leaves `token`
    /// untouched. The parent's reason is forwarded. The parent only holds
    /// the link weakly, so linked sources that are dropped or cancelled do
    /// not pile up on a long-lived token.
    pub fn linked(token: &CancellationToken) -> Self {
        let source = Self::new();
        if let Some(parent) = token.signal() {
            parent.link(&source.signal);
        }
        source
    }

    /// Creates a source that cancels itself with [`TaskError::Timeout`]
    /// once `timeout` has elapsed.
    pub fn cancel_after(timeout: Duration) -> Self {
        let source = Self::new();
        source.arm_timeout(timeout);
        source
    }

    /// Schedules a [`TaskError::Timeout`] cancellation of this source.
    pub(crate) fn arm_timeout(&self, timeout: Duration) {
        let source = self.clone();
        let timer = time::after(timeout, move || source.cancel_with(TaskError::Timeout));

        // Stop tracking the timer if the source is cancelled some other way.
        self.token().register(move || timer.cancel());
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("requested", &self.is_requested())
            .finish()
    }
}
