//! Error types shared by tasks, combinators and the scheduler.
//!
//! A task never stores a bare error. Every failure recorded on a task is
//! collected into an [`AggregateError`], a shared container that also
//! carries the *handled* flag used by the scheduler's unhandled-error sweep.

use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors produced by task bodies, combinators and usage mistakes.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The operation observed a cancellation request.
    #[error("operation was canceled{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Canceled { reason: Option<Box<TaskError>> },

    /// A timer expired before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// A step body or continuation panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Source(Arc<dyn Error + Send + Sync>),

    #[error(transparent)]
    Aggregate(AggregateError),

    /// The call is not valid in the current state of the receiver.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl TaskError {
    /// Builds a plain message error.
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Message(message.into())
    }

    /// Wraps an arbitrary error value.
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        TaskError::Source(Arc::new(error))
    }

    /// A cancellation error without a reason.
    pub fn canceled() -> Self {
        TaskError::Canceled { reason: None }
    }

    /// A cancellation error carrying `reason`.
    pub fn canceled_with(reason: TaskError) -> Self {
        TaskError::Canceled {
            reason: Some(Box::new(reason)),
        }
    }

    /// Returns `true` for cancellation-kind errors.
    ///
    /// An aggregate counts as a cancellation when it is non-empty and every
    /// error it holds is itself a cancellation.
    pub fn is_cancellation(&self) -> bool {
        match self {
            TaskError::Canceled { .. } => true,
            TaskError::Aggregate(aggregate) => aggregate.is_cancellation(),
            _ => false,
        }
    }

    /// Returns the cancellation reason, if this is a cancellation with one.
    pub fn cancel_reason(&self) -> Option<&TaskError> {
        match self {
            TaskError::Canceled { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

impl From<AggregateError> for TaskError {
    fn from(error: AggregateError) -> Self {
        TaskError::Aggregate(error)
    }
}

struct AggregateInner {
    errors: Mutex<Vec<TaskError>>,
    handled: AtomicBool,
}

/// An ordered collection of errors plus a `handled` flag.
///
/// `AggregateError` is a cheap handle: clones share both the error list
/// and the flag, so marking one clone handled marks every holder.
#[derive(Clone)]
pub struct AggregateError {
    inner: Arc<AggregateInner>,
}

impl AggregateError {
    /// Creates an unhandled aggregate from `errors`.
    ///
    /// Nested aggregates are flattened into the new container.
    pub fn new(errors: impl IntoIterator<Item = TaskError>) -> Self {
        let aggregate = Self::empty();
        for error in errors {
            aggregate.push(error);
        }
        aggregate
    }

    pub fn empty() -> Self {
        Self {
            inner: Arc::new(AggregateInner {
                errors: Mutex::new(Vec::new()),
                handled: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a snapshot of the contained errors.
    pub fn errors(&self) -> Vec<TaskError> {
        self.inner.errors.lock().clone()
    }

    pub fn first(&self) -> Option<TaskError> {
        self.inner.errors.lock().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.errors.lock().is_empty()
    }

    pub fn is_handled(&self) -> bool {
        self.inner.handled.load(Ordering::Acquire)
    }

    pub fn set_handled(&self, handled: bool) {
        self.inner.handled.store(handled, Ordering::Release);
    }

    /// Marks the aggregate as observed so the scheduler does not report it.
    pub fn mark_handled(&self) {
        self.set_handled(true);
    }

    /// Returns `true` if both handles refer to the same container.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns `true` if every contained error is a cancellation.
    pub fn is_cancellation(&self) -> bool {
        let errors = self.inner.errors.lock();
        !errors.is_empty() && errors.iter().all(TaskError::is_cancellation)
    }

    /// Appends `error`, flattening it if it is itself an aggregate.
    pub(crate) fn push(&self, error: TaskError) {
        match error {
            TaskError::Aggregate(other) => self.merge(&other),
            error => self.inner.errors.lock().push(error),
        }
    }

    /// Appends every error of `other` to this aggregate.
    pub(crate) fn merge(&self, other: &AggregateError) {
        if Self::ptr_eq(self, other) {
            return;
        }

        let incoming = other.errors();
        self.inner.errors.lock().extend(incoming);
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.inner.errors.lock();
        match errors.as_slice() {
            [] => write!(f, "one or more errors occurred"),
            [single] => write!(f, "{single}"),
            many => write!(f, "{} errors occurred", many.len()),
        }
    }
}

impl fmt::Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateError")
            .field("errors", &*self.inner.errors.lock())
            .field("handled", &self.is_handled())
            .finish()
    }
}

impl Error for AggregateError {}

/// Faults detected by the scheduler's own defensive checks.
///
/// These are delivered through [`Scheduler::on_internal_error`] and are
/// never returned to the caller of `tick`.
///
/// [`Scheduler::on_internal_error`]: crate::Scheduler::on_internal_error
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("tick is not reentrant: it was invoked while another tick was executing")]
    ReentrantTick,

    #[error("a posted callback panicked: {0}")]
    CallbackPanicked(String),

    #[error("the tick loop panicked: {0}")]
    TickPanicked(String),
}

/// Extracts a readable message from a `catch_unwind` payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
