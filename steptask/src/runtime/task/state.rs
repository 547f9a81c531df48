use std::fmt;

/// Task exists but has not been started.
pub(crate) const CREATED: u8 = 0;

/// Task has been started and is not yet terminal.
pub(crate) const RUNNING: u8 = 1;

/// The body finished without recording an error.
pub(crate) const RAN_TO_COMPLETION: u8 = 2;

/// At least one non-cancellation error was recorded.
pub(crate) const FAULTED: u8 = 3;

/// Every recorded error was a cancellation.
pub(crate) const CANCELED: u8 = 4;

/// Lifecycle of a task.
///
/// Status only moves forward: `Created` → `Running` → one of the three
/// terminal values. Terminal values are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Created,
    Running,
    RanToCompletion,
    Faulted,
    Canceled,
}

impl TaskStatus {
    /// Returns `true` for `RanToCompletion`, `Faulted` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::RanToCompletion | TaskStatus::Faulted | TaskStatus::Canceled
        )
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => TaskStatus::Created,
            RUNNING => TaskStatus::Running,
            RAN_TO_COMPLETION => TaskStatus::RanToCompletion,
            FAULTED => TaskStatus::Faulted,
            _ => TaskStatus::Canceled,
        }
    }

    pub(crate) fn into_raw(self) -> u8 {
        match self {
            TaskStatus::Created => CREATED,
            TaskStatus::Running => RUNNING,
            TaskStatus::RanToCompletion => RAN_TO_COMPLETION,
            TaskStatus::Faulted => FAULTED,
            TaskStatus::Canceled => CANCELED,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::RanToCompletion => "ran to completion",
            TaskStatus::Faulted => "faulted",
            TaskStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}
