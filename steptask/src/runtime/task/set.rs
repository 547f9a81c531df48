use super::{Task, TaskRef};
use crate::runtime::Scheduler;
use crate::tools::join_all;

/// A bag of tasks started fire-and-forget and joined later.
///
/// `TaskPool` is useful when work is kicked off in several places without
/// waiting, and a single point later needs to wait for all of it:
///
/// ```rust,ignore
/// let mut pool = TaskPool::new();
/// pool.register(&load_textures);
/// pool.register(&load_sounds);
///
/// let all = pool.join(&scheduler);
/// ```
///
/// Tasks may have different result types.
#[derive(Default)]
pub struct TaskPool {
    /// Registered tasks, in registration order.
    tasks: Vec<TaskRef>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the pool.
    pub fn register(&mut self, task: impl Into<TaskRef>) {
        self.tasks.push(task.into());
    }

    /// Number of tasks registered since the last [`join`](Self::join).
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Takes every registered task and returns a task completing once they
    /// are all terminal. The pool is empty afterwards and can be reused.
    pub fn join(&mut self, scheduler: &Scheduler) -> Task<()> {
        let tasks = std::mem::take(&mut self.tasks);
        join_all(scheduler, tasks)
    }

    /// Try-cancels every registered task and clears the pool.
    ///
    /// Tasks without a cancellation source keep running.
    pub fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.try_cancel();
        }
    }
}
