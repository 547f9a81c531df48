use crate::cancel::CancellationToken;
use crate::task::Task;

use std::fmt;
use std::sync::Arc;

/// Id of the terminal state. Reaching it ends [`StateMachine::run`].
///
/// [`StateMachine::run`]: super::StateMachine::run
pub const END_STATE_ID: i32 = -1;

/// Where a fired transition leads, with an argument for the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionOption {
    pub next_state_id: i32,
    pub option: i32,
}

impl TransitionOption {
    pub fn new(next_state_id: i32, option: i32) -> Self {
        Self {
            next_state_id,
            option,
        }
    }
}

pub(crate) type Trigger =
    Arc<dyn Fn(i32, CancellationToken) -> Task<TransitionOption> + Send + Sync + 'static>;

/// An edge out of a [`State`].
///
/// Each time its state is entered, the trigger is started with the
/// option the state was entered with and a token cancelled once another
/// transition wins.
#[derive(Clone)]
pub struct Transition {
    pub(crate) trigger: Trigger,
}

impl Transition {
    /// A transition whose trigger picks the next state itself.
    pub fn new<F>(trigger: F) -> Self
    where
        F: Fn(i32, CancellationToken) -> Task<TransitionOption> + Send + Sync + 'static,
    {
        Self {
            trigger: Arc::new(trigger),
        }
    }

    /// Moves to `next_state_id` with option `0` once the trigger finishes.
    ///
    /// A faulted trigger still fires the transition; its error is left for
    /// the unhandled sweep. A canceled trigger never fires.
    pub fn to<F>(next_state_id: i32, trigger: F) -> Self
    where
        F: Fn(CancellationToken) -> Task<()> + Send + Sync + 'static,
    {
        Self::new(move |_, token| {
            trigger(token).continue_with(move |_| Ok(TransitionOption::new(next_state_id, 0)))
        })
    }

    /// Moves to `next_state_id`, passing the trigger's value as option.
    /// A faulted trigger faults the run.
    pub fn to_with_option<F>(next_state_id: i32, trigger: F) -> Self
    where
        F: Fn(i32, CancellationToken) -> Task<i32> + Send + Sync + 'static,
    {
        Self::new(move |option, token| {
            trigger(option, token).then(move |value| Ok(TransitionOption::new(next_state_id, value)))
        })
    }

    /// Ends the machine once the trigger finishes.
    pub fn to_end<F>(trigger: F) -> Self
    where
        F: Fn(CancellationToken) -> Task<()> + Send + Sync + 'static,
    {
        Self::to(END_STATE_ID, trigger)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transition(..)")
    }
}

/// A state: an id plus the transitions raced while in it.
#[derive(Debug, Clone)]
pub struct State {
    pub(crate) id: i32,
    pub(crate) transitions: Vec<Transition>,
}

impl State {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            transitions: Vec::new(),
        }
    }

    /// Adds a transition. Returns `self` for chaining.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn id(&self) -> i32 {
        self.id
    }
}
