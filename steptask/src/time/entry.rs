use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Callback run on the timer thread when an entry expires.
pub(crate) type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// An entry in the timer queue.
///
/// Entries are stored in a `BinaryHeap` ordered by deadline. An entry may
/// be cancelled before it fires, in which case it is dropped unseen.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Work to run once the deadline is reached.
    pub(crate) callback: TimerCallback,

    /// Cancellation flag shared with the [`TimerGuard`](super::TimerGuard).
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
