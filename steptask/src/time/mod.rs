//! Wall-clock time utilities.
//!
//! Timers are driven by a single background thread owning a deadline
//! heap, so waiting never busy-polls the scheduler.
//!
//! It includes:
//! - [`after`] for running a callback once a delay elapses,
//! - [`delay`], [`delay_with`] and [`delay_frames`] for waiting tasks,
//! - [`timeout`] and [`run_with_timeout`] for bounding task execution.

mod command;
mod delay;
mod driver;
mod entry;
mod timeout;

#[doc(inline)]
pub use delay::{delay, delay_frames, delay_with};

#[doc(inline)]
pub use driver::{TimerGuard, after};

#[doc(inline)]
pub use timeout::{run_with_timeout, timeout};
