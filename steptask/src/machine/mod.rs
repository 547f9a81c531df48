//! A finite-state machine driven by tasks.
//!
//! Each [`State`] owns a set of [`Transition`]s whose triggers are tasks.
//! While a state is active its triggers race through
//! [`first`](crate::tools::first); the first to finish picks the next
//! state, and the others are cancelled.
//!
//! ```rust,ignore
//! let machine = StateMachine::builder(0)
//!     .state(State::new(0).transition(Transition::to(1, move |_| opened.clone())))
//!     .state(State::new(1).transition(Transition::to_end(move |_| closed.clone())))
//!     .build();
//!
//! machine.on_state_changed(|id, option| tracing::info!(id, option, "state changed"));
//! let done = machine.run(&scheduler, CancellationToken::none(), 0)?;
//! ```

mod state;

pub use state::{END_STATE_ID, State, Transition, TransitionOption};

use crate::cancel::{CancellationSource, CancellationToken};
use crate::error::TaskError;
use crate::runtime::Scheduler;
use crate::task::{Co, Routine, Step, StepResult, Task};
use crate::tools::first;

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

type StateListener = Arc<dyn Fn(i32, i32) + Send + Sync + 'static>;

struct Inner {
    initial_state_id: i32,
    states: IndexMap<i32, State>,
    listeners: Mutex<Vec<StateListener>>,
}

impl Inner {
    fn notify(&self, state_id: i32, option: i32) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(state_id, option);
        }
    }
}

/// A state machine whose transitions are triggered by tasks.
///
/// Cheap to clone; clones share states and listeners.
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<Inner>,
}

impl StateMachine {
    pub fn builder(initial_state_id: i32) -> StateMachineBuilder {
        StateMachineBuilder {
            initial_state_id,
            states: IndexMap::new(),
        }
    }

    pub fn initial_state_id(&self) -> i32 {
        self.inner.initial_state_id
    }

    /// Registers a listener called with `(state_id, option)` after every
    /// transition, including the final one into [`END_STATE_ID`].
    ///
    /// Entering the initial state is not reported.
    pub fn on_state_changed<F>(&self, listener: F)
    where
        F: Fn(i32, i32) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    /// Runs the machine from the initial state.
    ///
    /// The returned task completes once [`END_STATE_ID`] is reached, or
    /// right away if `token` is already cancelled. It faults if the
    /// machine enters an unknown state or a winning trigger that produces
    /// the next state fails, and is canceled if `token` fires while
    /// triggers are racing. Action triggers made with [`Transition::to`]
    /// fire their transition even when they fail.
    ///
    /// # Errors
    ///
    /// Fails if `scheduler` is shutting down.
    pub fn run(
        &self,
        scheduler: &Scheduler,
        token: CancellationToken,
        initial_option: i32,
    ) -> Result<Task<()>, TaskError> {
        let run = Run {
            inner: self.inner.clone(),
            token,
            cursor: Arc::new(Mutex::new(TransitionOption::new(
                self.inner.initial_state_id,
                initial_option,
            ))),
            waiting: None,
        };

        Task::run(scheduler, run)
    }
}

/// Builder for [`StateMachine`].
pub struct StateMachineBuilder {
    initial_state_id: i32,
    states: IndexMap<i32, State>,
}

impl StateMachineBuilder {
    /// Adds a state. A later state with the same id replaces the earlier one.
    pub fn state(mut self, state: State) -> Self {
        self.states.insert(state.id, state);
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            inner: Arc::new(Inner {
                initial_state_id: self.initial_state_id,
                states: self.states,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// The step body behind [`StateMachine::run`].
struct Run {
    inner: Arc<Inner>,
    token: CancellationToken,

    /// Current state id and the option it was entered with. Shared with
    /// the continuation applying a race's winner.
    cursor: Arc<Mutex<TransitionOption>>,

    /// Continuation applying the pending race, while suspended on it.
    waiting: Option<Task<()>>,
}

impl Run {
    /// Enters the current state: starts its triggers and returns the task
    /// that applies the winner.
    fn enter(&self, scheduler: &Scheduler) -> Result<Task<()>, TaskError> {
        let current = *self.cursor.lock();

        let state = self
            .inner
            .states
            .get(&current.next_state_id)
            .ok_or(TaskError::InvalidArgument("unknown state id"))?;

        let source = CancellationSource::linked(&self.token);
        let triggers: Vec<Task<TransitionOption>> = state
            .transitions
            .iter()
            .map(|transition| (transition.trigger)(current.option, source.token()))
            .collect();

        let race = first(scheduler, &triggers, Some(source))?;

        let inner = self.inner.clone();
        let cursor = self.cursor.clone();

        // Applied from the race's continuation so the notification lands
        // on the tick the winner completed.
        Ok(race.continue_with(move |race| {
            let next = race.result()?;
            *cursor.lock() = next;
            inner.notify(next.next_state_id, next.option);
            Ok(())
        }))
    }
}

impl Routine<()> for Run {
    fn step(&mut self, co: &mut Co<'_, ()>) -> StepResult {
        if let Some(applied) = self.waiting.take() {
            if !applied.is_completed() {
                let step = Step::wait(&applied);
                self.waiting = Some(applied);
                return Ok(step);
            }

            applied.check()?;

            if self.cursor.lock().next_state_id == END_STATE_ID {
                return Ok(Step::Done);
            }
        }

        if self.token.is_requested() {
            return Ok(Step::Done);
        }

        let applied = self.enter(co.scheduler())?;
        let step = Step::wait(&applied);
        self.waiting = Some(applied);
        Ok(step)
    }
}
