//! Task combinators.
//!
//! This module provides helpers composing several tasks into one:
//! - [`join_all`] and [`join_values`] wait for every input,
//! - [`when_any`], [`first`] and [`first_of`] race them,
//! - [`retry`] and [`Retry`] restart a failing task,
//! - [`sequential`] runs starters one after another,
//! - [`distinct`] keeps a starter from running twice at once.
//!
//! Every combinator is built on [`CompletionHandle`](crate::task::CompletionHandle)
//! and continuations; none of them steps tasks itself.

mod distinct;
mod join;
mod race;
mod retry;
mod sequence;

#[doc(inline)]
pub use distinct::{Distinct, distinct};

#[doc(inline)]
pub use join::{join_all, join_values};

#[doc(inline)]
pub use race::{first, first_of, when_any};

#[doc(inline)]
pub use retry::{Retry, retry};

#[doc(inline)]
pub use sequence::sequential;
