//! The step-body contract.
//!
//! A task advances its body one [`Step`] at a time. Every suspension point
//! is an explicit value returned from [`Routine::step`]; nothing is hidden
//! behind a waker.

use crate::cancel::CancellationToken;
use crate::error::TaskError;
use crate::runtime::Scheduler;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A callback run once something completes.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Something a task can suspend on.
///
/// Implemented by tasks themselves and by any external completion source
/// (an event library, a bridged platform future) that wants to plug into
/// the scheduler. `on_completed` may invoke the continuation from any
/// thread, but must invoke it exactly once.
pub trait Awaiter: Send + Sync {
    fn is_completed(&self) -> bool;

    /// Registers `continuation` to run once this awaiter completes.
    fn on_completed(&self, continuation: Continuation);
}

/// A shared, type-erased [`Awaiter`].
#[derive(Clone)]
pub struct Awaitable(Arc<dyn Awaiter>);

impl Awaitable {
    pub fn new<A>(awaiter: A) -> Self
    where
        A: Awaiter + 'static,
    {
        Self(Arc::new(awaiter))
    }

    pub fn from_arc(awaiter: Arc<dyn Awaiter>) -> Self {
        Self(awaiter)
    }

    pub fn is_completed(&self) -> bool {
        self.0.is_completed()
    }

    pub fn on_completed(&self, continuation: Continuation) {
        self.0.on_completed(continuation)
    }
}

impl fmt::Debug for Awaitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awaitable")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// What a step body produced.
pub enum Step {
    /// Run again on the next tick.
    Continue,

    /// Suspend until the awaitable completes.
    Await(Awaitable),

    /// Start the routine as a child task and suspend until it completes.
    Spawn(Box<dyn Routine<()>>),

    /// The body has finished.
    Done,
}

impl Step {
    /// Suspends on `awaitable`.
    pub fn wait(awaitable: impl Into<Awaitable>) -> Self {
        Step::Await(awaitable.into())
    }

    /// Spawns `routine` as a child task.
    pub fn spawn(routine: impl Routine<()>) -> Self {
        Step::Spawn(Box::new(routine))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Continue => f.write_str("Continue"),
            Step::Await(awaitable) => f.debug_tuple("Await").field(awaitable).finish(),
            Step::Spawn(_) => f.write_str("Spawn(..)"),
            Step::Done => f.write_str("Done"),
        }
    }
}

/// Result of one step. An `Err` faults the task.
pub type StepResult = Result<Step, TaskError>;

/// A resumable step body producing a `T`.
///
/// `step` is called once when the task starts and then at most once per
/// scheduler tick until it returns [`Step::Done`] or an error. Bodies set
/// their value through [`Co::set_result`].
pub trait Routine<T>: Send + 'static {
    fn step(&mut self, co: &mut Co<'_, T>) -> StepResult;
}

impl<T: 'static> Routine<T> for Box<dyn Routine<T>> {
    fn step(&mut self, co: &mut Co<'_, T>) -> StepResult {
        (**self).step(co)
    }
}

/// Per-step context handed to a [`Routine`].
pub struct Co<'a, T> {
    result: &'a mut Option<T>,
    scheduler: &'a Scheduler,
    token: &'a CancellationToken,
}

impl<'a, T> Co<'a, T> {
    pub(crate) fn new(
        result: &'a mut Option<T>,
        scheduler: &'a Scheduler,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            result,
            scheduler,
            token,
        }
    }

    /// Records the task's value. The last value set before `Done` wins.
    pub fn set_result(&mut self, value: T) {
        *self.result = Some(value);
    }

    /// The scheduler stepping this task.
    pub fn scheduler(&self) -> &Scheduler {
        self.scheduler
    }

    /// The task's cancellation token, or [`CancellationToken::none`].
    pub fn token(&self) -> &CancellationToken {
        self.token
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_requested()
    }

    pub fn throw_if_cancel_requested(&self) -> Result<(), TaskError> {
        self.token.throw_if_requested()
    }
}

/// A [`Routine`] built from a closure. See [`from_fn`].
pub struct FnRoutine<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

/// Turns a closure into a [`Routine`].
///
/// ```rust,ignore
/// let mut frames = 0;
/// let body = from_fn(move |co: &mut Co<'_, u32>| {
///     frames += 1;
///     if frames < 3 {
///         return Ok(Step::Continue);
///     }
///     co.set_result(frames);
///     Ok(Step::Done)
/// });
/// ```
pub fn from_fn<T, F>(f: F) -> FnRoutine<T, F>
where
    F: FnMut(&mut Co<'_, T>) -> StepResult + Send + 'static,
{
    FnRoutine {
        f,
        _marker: PhantomData,
    }
}

impl<T, F> Routine<T> for FnRoutine<T, F>
where
    T: 'static,
    F: FnMut(&mut Co<'_, T>) -> StepResult + Send + 'static,
{
    fn step(&mut self, co: &mut Co<'_, T>) -> StepResult {
        (self.f)(co)
    }
}
