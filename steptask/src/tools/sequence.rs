use crate::error::TaskError;
use crate::runtime::Scheduler;
use crate::task::{Step, Task, from_fn};

/// Runs task starters one after another.
///
/// Each starter is called once the previous task ran to completion. The
/// first failing task stops the sequence, and the returned task adopts its
/// error.
///
/// # Errors
///
/// Fails if `scheduler` is shutting down.
pub fn sequential<T, I, F>(scheduler: &Scheduler, starters: I) -> Result<Task<()>, TaskError>
where
    T: Send + 'static,
    I: IntoIterator<Item = F>,
    I::IntoIter: Send + 'static,
    F: FnOnce() -> Task<T>,
{
    let mut starters = starters.into_iter();
    let mut current: Option<Task<T>> = None;

    let body = from_fn(move |_co| {
        if let Some(task) = current.take() {
            task.check()?;
        }

        match starters.next() {
            Some(start) => {
                let task = start();
                let step = Step::wait(&task);
                current = Some(task);
                Ok(step)
            }
            None => Ok(Step::Done),
        }
    });

    Task::run(scheduler, body)
}
