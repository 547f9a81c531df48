//! Core runtime components.
//!
//! This module contains the scheduler and the task machinery it drives.
//!
//! It is responsible for:
//! - stepping tasks once per tick and parking those that await,
//! - running deferred continuation callbacks,
//! - tracking completion handles and reporting unobserved errors,
//! - graceful shutdown and the thread-local current scheduler.
//!
//! Most users will interact with [`Scheduler`] and [`task`] rather than
//! the registry internals.

mod core;
mod registry;

pub(crate) mod builder;
pub(crate) mod context;

pub mod task;

pub use self::core::{Scheduler, SchedulerStatus};
