//! # Steptask
//!
//! **Steptask** is a cooperative task runtime driven by explicit stepping.
//!
//! Instead of a thread pool or a waker-based executor, a [`Scheduler`] is
//! ticked by its host once per iteration ("frame"). Each tick advances
//! every running task by one step, resumes the tasks whose awaited work
//! completed and runs deferred continuations. Execution is deterministic
//! and frame-accurate, which makes it a good fit for game loops, UI loops
//! and simulations.
//!
//! It provides:
//!
//! - **Tasks** with a status, an error aggregate and continuations, built
//!   from hand-written step bodies or `async` blocks
//! - **Cancellation** sources and tokens, cooperative and fire-once
//! - **Completion handles** for tasks completed from the outside
//! - **Combinators**: join, race, first-wins with loser cancellation, retry,
//!   sequential execution, single-flight starters, delays and timeouts
//! - **Progress reporters** that hand values to listeners
//! - **A task-driven state machine** whose transitions race their triggers
//! - **Graceful shutdown** with a timeout and unhandled-error reporting
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use steptask::task::{Task, coroutine};
//! use steptask::time::delay;
//! use steptask::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//!
//! let task = Task::run(&scheduler, coroutine(|y| async move {
//!     y.next_frame().await;
//!     y.wait(&delay(&y.scheduler().unwrap(), Duration::from_millis(5))).await;
//!     Ok(42)
//! }))?;
//!
//! while !task.is_completed() {
//!     scheduler.tick();
//! }
//! assert_eq!(task.result()?, 42);
//! ```
//!
//! ## Modules
//!
//! - [`task`]: Tasks, step bodies, completion handles and pools
//! - [`cancel`]: Cancellation sources and tokens
//! - [`time`]: Timers, delays and timeouts
//! - [`tools`]: Join, race, retry and sequencing combinators
//! - [`machine`]: Task-driven state machine
//! - [`logging`]: Optional `tracing` subscriber setup

mod runtime;

pub mod cancel;
pub mod error;
pub mod logging;
pub mod machine;
pub mod time;
pub mod tools;

pub use runtime::builder::{SchedulerBuilder, SchedulerConfig};
pub use runtime::task;
pub use runtime::{Scheduler, SchedulerStatus};

pub use cancel::{CancellationSource, CancellationToken};
pub use error::{AggregateError, SchedulerError, TaskError};
pub use task::{CompletionHandle, Progress, Task, TaskRef, TaskStatus};
