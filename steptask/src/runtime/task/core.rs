use super::state::{RUNNING, TaskStatus};
use super::step::{Awaiter, Co, Continuation, Routine, Step};
use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::{AggregateError, TaskError, panic_message};
use crate::runtime::Scheduler;

use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the scheduler learns from stepping a task once.
pub(crate) enum StepOutcome {
    /// The body yielded and is not finished.
    Yielded(Step),

    /// Another caller is currently stepping this task, or it has no body.
    Busy,

    /// The task is terminal.
    Finished,
}

/// Mutable task state, guarded by [`TaskCore::state`].
struct TaskState<T> {
    /// The step body. Taken out while a step runs.
    routine: Option<Box<dyn Routine<T>>>,

    /// A yield produced outside a tick (by `start` or a forced
    /// cancellation step), handed to the scheduler on its next visit.
    pending: Option<Step>,

    result: Option<T>,
    error: Option<AggregateError>,

    /// Continuations waiting for completion, in registration order.
    callbacks: Vec<Continuation>,

    cancellation: Option<CancellationSource>,

    /// Owning scheduler, set by `start`.
    scheduler: Option<Scheduler>,
}

/// Shared core of a task.
///
/// `status` is readable without locking; it is only ever written while
/// `state` is held, so status and state never disagree for lock holders.
pub(crate) struct TaskCore<T> {
    id: TaskId,
    status: AtomicU8,
    state: Mutex<TaskState<T>>,
}

impl<T: Send + 'static> TaskCore<T> {
    pub(crate) fn new(routine: Option<Box<dyn Routine<T>>>, status: TaskStatus) -> Self {
        Self {
            id: TaskId::next(),
            status: AtomicU8::new(status.into_raw()),
            state: Mutex::new(TaskState {
                routine,
                pending: None,
                result: None,
                error: None,
                callbacks: Vec::new(),
                cancellation: None,
                scheduler: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    pub(crate) fn error(&self) -> Option<AggregateError> {
        self.state.lock().error.clone()
    }

    pub(crate) fn scheduler(&self) -> Option<Scheduler> {
        self.state.lock().scheduler.clone()
    }

    pub(crate) fn cancellation(&self) -> Option<CancellationSource> {
        self.state.lock().cancellation.clone()
    }

    pub(crate) fn set_cancellation(&self, source: CancellationSource) {
        self.state.lock().cancellation = Some(source);
    }

    pub(crate) fn bind(&self, scheduler: &Scheduler) {
        self.state.lock().scheduler = Some(scheduler.clone());
    }

    /// Moves a `Created` task to `Running` on `scheduler`.
    pub(crate) fn begin(&self, scheduler: &Scheduler) -> Result<(), TaskError> {
        let mut state = self.state.lock();

        if self.status() != TaskStatus::Created {
            return Err(TaskError::InvalidOperation("task has already been started"));
        }

        state.scheduler = Some(scheduler.clone());
        self.status.store(RUNNING, Ordering::Release);
        Ok(())
    }

    /// Returns the stashed yield if there is one, otherwise advances the body.
    pub(crate) fn step(&self) -> StepOutcome {
        {
            let mut state = self.state.lock();
            if self.status() != TaskStatus::Running {
                return StepOutcome::Finished;
            }
            if let Some(step) = state.pending.take() {
                return StepOutcome::Yielded(step);
            }
        }

        self.advance()
    }

    /// Advances the body once and stashes a non-final yield for the
    /// scheduler's next visit.
    pub(crate) fn run_once(&self) -> StepOutcome {
        match self.advance() {
            StepOutcome::Yielded(step) => {
                let mut state = self.state.lock();
                if self.status() == TaskStatus::Running {
                    state.pending = Some(step);
                }
                StepOutcome::Busy
            }
            outcome => outcome,
        }
    }

    /// Runs the body once inside a panic guard.
    fn advance(&self) -> StepOutcome {
        let (mut routine, scheduler, token) = {
            let mut state = self.state.lock();

            if self.status() != TaskStatus::Running {
                return StepOutcome::Finished;
            }

            let Some(scheduler) = state.scheduler.clone() else {
                return StepOutcome::Busy;
            };
            let Some(routine) = state.routine.take() else {
                return StepOutcome::Busy;
            };

            let token = state
                .cancellation
                .as_ref()
                .map(CancellationSource::token)
                .unwrap_or_else(CancellationToken::none);

            (routine, scheduler, token)
        };

        let mut slot = None;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut co = Co::new(&mut slot, &scheduler, &token);
            routine.step(&mut co)
        }));

        let mut state = self.state.lock();
        if let Some(value) = slot {
            state.result = Some(value);
        }

        match outcome {
            Ok(Ok(Step::Done)) => {
                self.finish(state);
                StepOutcome::Finished
            }
            Ok(Ok(step)) => {
                if self.status().is_terminal() {
                    return StepOutcome::Finished;
                }
                state.routine = Some(routine);
                StepOutcome::Yielded(step)
            }
            Ok(Err(error)) => {
                add_error(&mut state, error);
                self.finish(state);
                StepOutcome::Finished
            }
            Err(payload) => {
                add_error(&mut state, TaskError::Panicked(panic_message(payload)));
                self.finish(state);
                StepOutcome::Finished
            }
        }
    }

    /// Records `error` and completes the task.
    pub(crate) fn fault(&self, error: TaskError) {
        let mut state = self.state.lock();
        if self.is_completed() {
            return;
        }
        add_error(&mut state, error);
        self.finish(state);
    }

    /// Signals the attached source and forces one step.
    ///
    /// Returns `false` when no cancellation source is attached.
    pub(crate) fn request_cancel(&self, reason: Option<TaskError>) -> bool {
        if self.is_completed() {
            return true;
        }

        let Some(source) = self.cancellation() else {
            return false;
        };

        match reason {
            Some(reason) => source.cancel_with(reason),
            None => source.cancel(),
        }

        self.force_step();
        true
    }

    fn force_step(&self) {
        if self.status() != TaskStatus::Running || self.state.lock().pending.is_some() {
            return;
        }

        if let StepOutcome::Finished = self.run_once() {
            if let Some(scheduler) = self.scheduler() {
                scheduler.wake(self.id);
            }
        }
    }

    /// Sets the result and completes. Fails once terminal.
    pub(crate) fn complete_with_result(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if self.is_completed() {
            return false;
        }
        state.result = Some(value);
        self.finish(state);
        true
    }

    pub(crate) fn complete_with_error(&self, error: TaskError) -> bool {
        let mut state = self.state.lock();
        if self.is_completed() {
            return false;
        }
        add_error(&mut state, error);
        self.finish(state);
        true
    }

    /// Copies the outcome of `other`, which must already be terminal.
    pub(crate) fn complete_from(&self, other: &TaskCore<T>) -> bool
    where
        T: Clone,
    {
        let (status, value, error) = {
            let state = other.state.lock();
            (other.status(), state.result.clone(), state.error.clone())
        };

        match status {
            TaskStatus::RanToCompletion => match value {
                Some(value) => self.complete_with_result(value),
                None => self.complete_empty(),
            },
            TaskStatus::Faulted | TaskStatus::Canceled => {
                let error = error.map(TaskError::Aggregate).unwrap_or_else(TaskError::canceled);
                self.complete_with_error(error)
            }
            _ => false,
        }
    }

    /// Completes without a value. Used for unit-like results.
    pub(crate) fn complete_empty(&self) -> bool {
        let state = self.state.lock();
        if self.is_completed() {
            return false;
        }
        self.finish(state);
        true
    }

    /// Returns the value of a completed task.
    pub(crate) fn result(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let state = self.state.lock();

        match self.status() {
            TaskStatus::RanToCompletion => state
                .result
                .clone()
                .ok_or(TaskError::InvalidOperation("task completed without a value")),
            TaskStatus::Faulted | TaskStatus::Canceled => Err(state
                .error
                .clone()
                .map(TaskError::Aggregate)
                .unwrap_or_else(TaskError::canceled)),
            TaskStatus::Created | TaskStatus::Running => {
                Err(TaskError::InvalidOperation("task has not completed yet"))
            }
        }
    }

    /// Registers a continuation.
    ///
    /// Continuations are always posted, never run inline, even when the
    /// task is already terminal.
    pub(crate) fn on_completed_raw(&self, continuation: Continuation) {
        let mut state = self.state.lock();

        if !self.is_completed() {
            state.callbacks.push(continuation);
            return;
        }

        let scheduler = state.scheduler.clone().unwrap_or_else(Scheduler::fallback);
        drop(state);
        scheduler.post_boxed(continuation);
    }

    /// Moves the task to its terminal status and posts its continuations.
    fn finish(&self, mut state: MutexGuard<'_, TaskState<T>>) {
        if self.is_completed() {
            return;
        }

        let status = match &state.error {
            None => TaskStatus::RanToCompletion,
            Some(error) if error.is_cancellation() => TaskStatus::Canceled,
            Some(_) => TaskStatus::Faulted,
        };

        if status == TaskStatus::RanToCompletion && state.result.is_none() {
            state.result = unit_value::<T>();
        }

        state.pending = None;
        self.status.store(status.into_raw(), Ordering::Release);

        let callbacks = std::mem::take(&mut state.callbacks);
        let scheduler = state.scheduler.clone();
        let error = state.error.clone();
        let routine = state.routine.take();
        drop(state);
        drop(routine);

        match (status, error) {
            (TaskStatus::Faulted, Some(error)) => {
                tracing::debug!(task = %self.id, error = %error, "task faulted");
            }
            _ => tracing::trace!(task = %self.id, %status, "task completed"),
        }

        let scheduler = scheduler.unwrap_or_else(Scheduler::fallback);
        for callback in callbacks {
            scheduler.post_boxed(callback);
        }
    }
}

impl<T: Send + 'static> Awaiter for TaskCore<T> {
    fn is_completed(&self) -> bool {
        TaskCore::is_completed(self)
    }

    fn on_completed(&self, continuation: Continuation) {
        self.on_completed_raw(continuation)
    }
}

/// Appends `error` to the task's aggregate.
///
/// A task without errors adopts an incoming aggregate as-is, so the
/// handled flag stays shared with whoever produced it.
fn add_error<T>(state: &mut TaskState<T>, error: TaskError) {
    if let Some(current) = &state.error {
        current.push(error);
        return;
    }

    state.error = Some(match error {
        TaskError::Aggregate(aggregate) => aggregate,
        error => AggregateError::new([error]),
    });
}

/// `Some(())` when `T` is the unit type, `None` otherwise.
///
/// Lets a unit task that never called `set_result` still report `Ok(())`.
fn unit_value<T: 'static>() -> Option<T> {
    let unit: Box<dyn Any> = Box::new(());
    unit.downcast::<T>().ok().map(|value| *value)
}

/// Type-erased view of a task used by the scheduler and combinators.
pub(crate) trait RawTask: Awaiter {
    fn id(&self) -> TaskId;
    fn status(&self) -> TaskStatus;
    fn error(&self) -> Option<AggregateError>;
    fn step(&self) -> StepOutcome;
    fn try_cancel(&self);
    fn fault(&self, error: TaskError);
}

impl<T: Send + 'static> RawTask for TaskCore<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        TaskCore::status(self)
    }

    fn error(&self) -> Option<AggregateError> {
        TaskCore::error(self)
    }

    fn step(&self) -> StepOutcome {
        TaskCore::step(self)
    }

    fn try_cancel(&self) {
        self.request_cancel(None);
    }

    fn fault(&self, error: TaskError) {
        TaskCore::fault(self, error)
    }
}
