use super::step::{Awaitable, Co, Routine, Step, StepResult};
use super::Task;
use crate::cancel::CancellationToken;
use crate::error::TaskError;
use crate::runtime::Scheduler;

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// State shared between a [`Coroutine`] and the [`Yielder`] its body holds.
#[derive(Default)]
struct Channel {
    /// The step requested by the most recent `Yield` future.
    step: Mutex<Option<Step>>,

    /// Token of the task being stepped, refreshed before every poll.
    token: Mutex<CancellationToken>,

    scheduler: Mutex<Option<Scheduler>>,
}

/// Handle given to a coroutine body to produce explicit suspension points.
///
/// Every method returning a [`Yield`] suspends the body until the next
/// step; awaiting anything else that is not ready simply re-polls it on
/// the following tick.
#[derive(Clone)]
pub struct Yielder {
    channel: Arc<Channel>,
}

impl Yielder {
    fn yield_step(&self, step: Step) -> Yield {
        Yield {
            step: Some(step),
            channel: self.channel.clone(),
        }
    }

    /// Suspends until the next tick.
    pub fn next_frame(&self) -> Yield {
        self.yield_step(Step::Continue)
    }

    /// Suspends until `awaitable` completes.
    pub fn wait(&self, awaitable: impl Into<Awaitable>) -> Yield {
        self.yield_step(Step::Await(awaitable.into()))
    }

    /// Runs `routine` as a child task and suspends until it completes.
    pub fn spawn(&self, routine: impl Routine<()>) -> Yield {
        self.yield_step(Step::spawn(routine))
    }

    /// Suspends until `task` is terminal, then reads its result.
    pub async fn wait_task<U>(&self, task: &Task<U>) -> Result<U, TaskError>
    where
        U: Clone + Send + 'static,
    {
        while !task.is_completed() {
            self.wait(task).await;
        }

        task.result()
    }

    /// The token of the task running this coroutine.
    pub fn token(&self) -> CancellationToken {
        self.channel.token.lock().clone()
    }

    pub fn throw_if_cancel_requested(&self) -> Result<(), TaskError> {
        self.token().throw_if_requested()
    }

    /// The scheduler stepping this coroutine.
    ///
    /// `None` only before the first step.
    pub fn scheduler(&self) -> Option<Scheduler> {
        self.channel.scheduler.lock().clone()
    }
}

/// A future that hands one [`Step`] to the scheduler.
///
/// Pending on its first poll, ready on the second.
pub struct Yield {
    step: Option<Step>,
    channel: Arc<Channel>,
}

impl Future for Yield {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.step.take() {
            Some(step) => {
                *this.channel.step.lock() = Some(step);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

type BoxedBody<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send + 'static>>;

/// A [`Routine`] driven by an `async` body. See [`coroutine`].
pub struct Coroutine<T> {
    body: BoxedBody<T>,
    channel: Arc<Channel>,
}

/// Builds a routine from an `async` body.
///
/// The future is polled once per step with a no-op waker. Each
/// [`Yield`] it awaits becomes the step returned to the scheduler; when
/// the future resolves, its value becomes the task's result.
///
/// ```rust,ignore
/// let task = Task::run(&scheduler, coroutine(|y| async move {
///     for _ in 0..3 {
///         y.next_frame().await;
///     }
///     let value = y.wait_task(&other).await?;
///     Ok(value * 2)
/// }))?;
/// ```
pub fn coroutine<T, F, Fut>(body: F) -> Coroutine<T>
where
    T: Send + 'static,
    F: FnOnce(Yielder) -> Fut,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    let channel = Arc::new(Channel::default());
    let yielder = Yielder {
        channel: channel.clone(),
    };

    Coroutine {
        body: Box::pin(body(yielder)),
        channel,
    }
}

impl<T: Send + 'static> Routine<T> for Coroutine<T> {
    fn step(&mut self, co: &mut Co<'_, T>) -> StepResult {
        *self.channel.token.lock() = co.token().clone();
        *self.channel.scheduler.lock() = Some(co.scheduler().clone());

        let mut cx = Context::from_waker(Waker::noop());

        match self.body.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(value)) => {
                co.set_result(value);
                Ok(Step::Done)
            }
            Poll::Ready(Err(error)) => Err(error),
            Poll::Pending => Ok(self.channel.step.lock().take().unwrap_or(Step::Continue)),
        }
    }
}
