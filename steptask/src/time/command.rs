use super::entry::TimerCallback;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Messages sent from the rest of the crate to the timer thread.
pub(crate) enum Command {
    SetTimer {
        deadline: Instant,
        callback: TimerCallback,
        cancelled: Arc<AtomicBool>,
    },
    Shutdown,
}
