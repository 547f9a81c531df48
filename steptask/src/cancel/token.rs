use super::source::{CancellationSource, Signal};
use crate::error::TaskError;

use std::sync::Arc;
use std::time::Duration;

/// A read-only view of a [`CancellationSource`].
///
/// Tokens are cheap to clone and are what step bodies receive. Two tokens
/// are equal when they observe the same source. [`CancellationToken::none`]
/// observes nothing and is never cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    signal: Option<Arc<Signal>>,
}

impl CancellationToken {
    pub(crate) fn from_signal(signal: Arc<Signal>) -> Self {
        Self {
            signal: Some(signal),
        }
    }

    pub(crate) fn signal(&self) -> Option<&Arc<Signal>> {
        self.signal.as_ref()
    }

    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.is_requested())
    }

    /// Returns `false` for [`CancellationToken::none`].
    pub fn can_be_canceled(&self) -> bool {
        self.signal.is_some()
    }

    pub fn reason(&self) -> Option<TaskError> {
        self.signal.as_ref().and_then(|s| s.reason())
    }

    /// Runs `callback` once cancellation is requested.
    ///
    /// If cancellation has already been requested the callback runs
    /// synchronously, before `register` returns. Registering on a token
    /// that can never be cancelled drops the callback.
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(signal) = &self.signal {
            signal.register(Box::new(callback));
        }
    }

    /// Returns a cancellation error if cancellation has been requested.
    ///
    /// The error carries the source's reason when one was given.
    pub fn throw_if_requested(&self) -> Result<(), TaskError> {
        if !self.is_requested() {
            return Ok(());
        }

        Err(TaskError::Canceled {
            reason: self.reason().map(Box::new),
        })
    }

    /// Creates a source linked to this token that additionally cancels
    /// itself with [`TaskError::Timeout`] after `timeout`.
    pub fn cancel_after(&self, timeout: Duration) -> CancellationSource {
        let source = CancellationSource::linked(self);
        source.arm_timeout(timeout);
        source
    }
}

impl PartialEq for CancellationToken {
    fn eq(&self, other: &Self) -> bool {
        match (&self.signal, &other.signal) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for CancellationToken {}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_canceled", &self.can_be_canceled())
            .field("requested", &self.is_requested())
            .finish()
    }
}
