use crate::task::{Continuation, TaskId, TaskRef};

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// The scheduler's task sets.
///
/// `running` and `suspended` are disjoint. Migration between them can be
/// triggered from any thread (an awaitable completing on a timer thread),
/// so every mutation happens under the one lock.
#[derive(Default)]
struct TaskSets {
    running: IndexMap<TaskId, TaskRef>,
    suspended: IndexMap<TaskId, TaskRef>,

    /// Completion handles awaiting external completion. Never stepped.
    pending: IndexMap<TaskId, TaskRef>,
}

/// Thread-safe bookkeeping of every task a scheduler tracks.
#[derive(Default)]
pub(crate) struct Registry {
    sets: Mutex<TaskSets>,

    /// Tasks that became terminal and still need the unhandled-error sweep.
    completed: Mutex<Vec<TaskRef>>,
}

impl Registry {
    /// Adds a task to the running set unless it is already tracked.
    pub(crate) fn admit(&self, task: TaskRef) {
        let mut sets = self.sets.lock();
        let id = task.id();

        if !sets.running.contains_key(&id) && !sets.suspended.contains_key(&id) {
            sets.running.insert(id, task);
        }
    }

    pub(crate) fn running(&self) -> Vec<TaskRef> {
        self.sets.lock().running.values().cloned().collect()
    }

    pub(crate) fn suspended(&self) -> Vec<TaskRef> {
        self.sets.lock().suspended.values().cloned().collect()
    }

    pub(crate) fn pending(&self) -> Vec<TaskRef> {
        self.sets.lock().pending.values().cloned().collect()
    }

    /// Drops a task from the running set.
    pub(crate) fn remove(&self, id: TaskId) {
        self.sets.lock().running.shift_remove(&id);
    }

    /// Moves a task from running to suspended.
    pub(crate) fn suspend(&self, id: TaskId) -> bool {
        let mut sets = self.sets.lock();

        match sets.running.shift_remove(&id) {
            Some(task) => {
                sets.suspended.insert(id, task);
                true
            }
            None => false,
        }
    }

    /// Moves a task from suspended back to running.
    pub(crate) fn resume(&self, id: TaskId) -> bool {
        let mut sets = self.sets.lock();

        match sets.suspended.shift_remove(&id) {
            Some(task) => {
                sets.running.insert(id, task);
                true
            }
            None => false,
        }
    }

    pub(crate) fn track_pending(&self, task: TaskRef) {
        self.sets.lock().pending.insert(task.id(), task);
    }

    pub(crate) fn release_pending(&self, id: TaskId) {
        self.sets.lock().pending.shift_remove(&id);
    }

    /// Queues a terminal task for the unhandled-error sweep.
    pub(crate) fn retire(&self, task: TaskRef) {
        self.completed.lock().push(task);
    }

    pub(crate) fn take_retired(&self) -> Vec<TaskRef> {
        std::mem::take(&mut *self.completed.lock())
    }

    /// `true` when nothing is running, suspended or pending.
    pub(crate) fn is_idle(&self) -> bool {
        let sets = self.sets.lock();
        sets.running.is_empty() && sets.suspended.is_empty() && sets.pending.is_empty()
    }

    pub(crate) fn has_running(&self) -> bool {
        !self.sets.lock().running.is_empty()
    }
}

/// Deferred continuation callbacks, run in FIFO order on a tick.
#[derive(Default)]
pub(crate) struct PostQueue {
    queue: Mutex<VecDeque<Continuation>>,
}

impl PostQueue {
    pub(crate) fn push(&self, callback: Continuation) {
        self.queue.lock().push_back(callback);
    }

    /// Takes everything queued so far. Callbacks posted while the batch
    /// runs land in the next batch.
    pub(crate) fn take_batch(&self) -> VecDeque<Continuation> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
