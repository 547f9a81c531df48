//! Cooperative cancellation.
//!
//! A [`CancellationSource`] owns the request flag; the
//! [`CancellationToken`]s it hands out can only observe it. Cancellation
//! never interrupts a running step: bodies check the token at their own
//! suspension points.

mod source;
mod token;

pub use source::CancellationSource;
pub use token::CancellationToken;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_fire_once_in_registration_order() {
        let source = CancellationSource::new();
        let token = source.token();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            token.register(move || log.lock().push(i));
        }

        source.cancel();
        source.cancel();

        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn late_registration_fires_immediately() {
        let source = CancellationSource::new();
        source.cancel();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        source.token().register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_reason_wins() {
        let source = CancellationSource::new();
        source.cancel_with(TaskError::msg("first"));
        source.cancel_with(TaskError::msg("second"));

        let error = source.token().throw_if_requested().unwrap_err();
        assert_eq!(error.cancel_reason().map(|r| r.to_string()).as_deref(), Some("first"));
    }

    #[test]
    fn tokens_compare_by_source() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();

        assert_eq!(a.token(), a.token());
        assert_ne!(a.token(), b.token());
        assert_eq!(CancellationToken::none(), CancellationToken::none());
        assert_ne!(a.token(), CancellationToken::none());
    }

    #[test]
    fn linked_source_is_one_way() {
        let parent = CancellationSource::new();
        let child = CancellationSource::linked(&parent.token());

        child.cancel();
        assert!(!parent.is_requested());

        let other = CancellationSource::linked(&parent.token());
        parent.cancel_with(TaskError::Timeout);
        assert!(other.is_requested());
        assert!(matches!(other.reason(), Some(TaskError::Timeout)));
    }
}
