use super::builder::{SchedulerBuilder, SchedulerConfig};
use super::context::{current, enter_context};
use super::registry::{PostQueue, Registry};
use crate::error::{SchedulerError, TaskError, panic_message};
use crate::task::{Awaitable, Continuation, Step, Task, TaskId, TaskRef};
use crate::task::core::StepOutcome;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide default scheduler, built on first use.
static GLOBAL: Lazy<Scheduler> = Lazy::new(Scheduler::new);

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerStatus {
    /// Accepting and stepping tasks.
    Running,

    /// Shutdown requested. Tracked tasks keep running, new ones are refused.
    Shutdown,

    /// Every tracked task finished before the timeout.
    ShutdownCompleted,

    /// The timeout elapsed and stragglers were force-cancelled.
    ShutdownTimeout,
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerStatus::Running => "running",
            SchedulerStatus::Shutdown => "shutdown",
            SchedulerStatus::ShutdownCompleted => "shutdown-completed",
            SchedulerStatus::ShutdownTimeout => "shutdown-timeout",
        };
        f.write_str(name)
    }
}

type ShutdownCallback = Box<dyn FnOnce(SchedulerStatus) + Send + 'static>;
type UnhandledListener = Arc<dyn Fn(&TaskRef) + Send + Sync + 'static>;
type InternalListener = Arc<dyn Fn(&SchedulerError) + Send + Sync + 'static>;

struct Lifecycle {
    status: SchedulerStatus,
    shutdown_started: Option<Instant>,
    shutdown_callback: Option<ShutdownCallback>,
    shutdown_timeout: Duration,
}

#[derive(Default)]
struct Listeners {
    unhandled: Vec<UnhandledListener>,
    internal: Vec<InternalListener>,
}

pub(crate) struct SchedulerCore {
    id: u64,
    post_passes: usize,
    detect_reentrancy: bool,

    registry: Registry,
    posts: PostQueue,
    lifecycle: Mutex<Lifecycle>,
    listeners: Mutex<Listeners>,

    /// Set while a tick is executing.
    ticking: AtomicBool,
    tick_count: AtomicU64,
}

/// A single-stepped cooperative task scheduler.
///
/// `Scheduler` is responsible for:
/// - stepping every running task once per [`tick`](Self::tick),
/// - parking tasks that await something and resuming them once it completes,
/// - running posted continuation callbacks between steps,
/// - reporting task errors nobody observed,
/// - graceful shutdown with a timeout.
///
/// Tick is meant to be called once per host iteration ("frame") from one
/// thread. Everything else, including resumption, may happen from any
/// thread. `Scheduler` is a cheap handle; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Creates a scheduler from an explicit configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let id = NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scheduler = id, ?config, "scheduler created");

        Self {
            core: Arc::new(SchedulerCore {
                id,
                post_passes: config.post_passes.max(1),
                detect_reentrancy: config.detect_reentrancy,
                registry: Registry::default(),
                posts: PostQueue::default(),
                lifecycle: Mutex::new(Lifecycle {
                    status: SchedulerStatus::Running,
                    shutdown_started: None,
                    shutdown_callback: None,
                    shutdown_timeout: config.shutdown_timeout(),
                }),
                listeners: Mutex::new(Listeners::default()),
                ticking: AtomicBool::new(false),
                tick_count: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide default scheduler.
    ///
    /// Only a convenience: nothing in the crate requires it, and it is
    /// never ticked implicitly.
    pub fn global() -> &'static Scheduler {
        &GLOBAL
    }

    /// The scheduler whose tick is executing on this thread.
    pub fn current() -> Option<Scheduler> {
        current()
    }

    /// The current scheduler, or the global one outside a tick.
    pub(crate) fn fallback() -> Scheduler {
        current().unwrap_or_else(|| Self::global().clone())
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn status(&self) -> SchedulerStatus {
        self.core.lifecycle.lock().status
    }

    /// Number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.core.tick_count.load(Ordering::Acquire)
    }

    /// Snapshot of the tasks stepped on each tick.
    pub fn running_tasks(&self) -> Vec<TaskRef> {
        self.core.registry.running()
    }

    /// Snapshot of the tasks parked on an awaitable.
    pub fn suspended_tasks(&self) -> Vec<TaskRef> {
        self.core.registry.suspended()
    }

    /// Snapshot of the completion handles not completed yet.
    pub fn pending_handles(&self) -> Vec<TaskRef> {
        self.core.registry.pending()
    }

    /// `true` when at least one task is running.
    pub fn is_active(&self) -> bool {
        self.core.registry.has_running()
    }

    /// `true` when at least one task is running or suspended.
    pub fn has_any_task(&self) -> bool {
        self.is_active() || !self.core.registry.suspended().is_empty()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.core.lifecycle.lock().shutdown_timeout
    }

    pub fn set_shutdown_timeout(&self, timeout: Duration) {
        self.core.lifecycle.lock().shutdown_timeout = timeout;
    }

    /// Registers a listener for task errors nobody observed.
    ///
    /// Called during a tick, at most once per error.
    pub fn on_unhandled_error<F>(&self, listener: F)
    where
        F: Fn(&TaskRef) + Send + Sync + 'static,
    {
        self.core.listeners.lock().unhandled.push(Arc::new(listener));
    }

    /// Registers a listener for faults of the scheduler loop itself.
    pub fn on_internal_error<F>(&self, listener: F)
    where
        F: Fn(&SchedulerError) + Send + Sync + 'static,
    {
        self.core.listeners.lock().internal.push(Arc::new(listener));
    }

    /// Queues a callback to run on a later tick.
    ///
    /// Callbacks run in FIFO order. A panicking callback is reported as
    /// [`SchedulerError::CallbackPanicked`] and does not stop the others.
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.posts.push(Box::new(callback));
    }

    pub(crate) fn post_boxed(&self, callback: Continuation) {
        self.core.posts.push(callback);
    }

    pub(crate) fn ensure_accepting(&self) -> Result<(), TaskError> {
        if self.status() == SchedulerStatus::Running {
            Ok(())
        } else {
            Err(TaskError::InvalidOperation("scheduler is shutting down"))
        }
    }

    /// Admits a started task into the running set.
    pub(crate) fn queue_task(&self, task: TaskRef) -> Result<(), TaskError> {
        self.ensure_accepting()?;
        self.core.registry.admit(task);
        Ok(())
    }

    /// Hands a task that completed outside a tick to the error sweep.
    pub(crate) fn track_completed(&self, task: TaskRef) {
        self.core.registry.retire(task);
    }

    /// Tracks a completion handle's task until it completes.
    pub(crate) fn track_pending(&self, task: TaskRef) {
        self.core.registry.track_pending(task.clone());

        let core = Arc::downgrade(&self.core);
        let id = task.id();
        let handle = task.clone();
        task.on_completed(move || {
            if let Some(core) = core.upgrade() {
                core.registry.release_pending(id);
                core.registry.retire(handle);
            }
        });
    }

    /// Moves a suspended task back to running.
    ///
    /// May be called from any thread.
    pub(crate) fn wake(&self, id: TaskId) {
        wake(&self.core, id);
    }

    /// Runs one scheduling pass.
    ///
    /// Steps every running task once, resolves synchronous continuation
    /// chains, reports unobserved errors and advances a pending shutdown.
    /// Never panics and never returns an error; faults of the loop itself
    /// go to the [internal-error listeners](Self::on_internal_error).
    ///
    /// Not reentrant. A nested or concurrent call returns immediately.
    pub fn tick(&self) {
        if self.core.ticking.swap(true, Ordering::AcqRel) {
            if self.core.detect_reentrancy {
                self.report(SchedulerError::ReentrantTick);
            }
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            enter_context(self, || self.tick_body());
        }));

        if let Err(payload) = outcome {
            self.report(SchedulerError::TickPanicked(panic_message(payload)));
        }

        self.core.tick_count.fetch_add(1, Ordering::AcqRel);
        self.core.ticking.store(false, Ordering::Release);
    }

    /// Calls [`tick`](Self::tick) `n` times.
    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    fn tick_body(&self) {
        // Callbacks posted since the last tick, e.g. by external completions.
        self.run_posts();
        self.check_errors();

        let mut stepped = HashSet::new();

        // Tasks queued or resumed while stepping run in the same tick.
        loop {
            let batch: Vec<TaskRef> = self
                .core
                .registry
                .running()
                .into_iter()
                .filter(|task| stepped.insert(task.id()))
                .collect();

            if batch.is_empty() {
                break;
            }

            for task in &batch {
                self.run_task(task);
            }

            self.run_posts();
            self.check_errors();
        }

        self.check_shutdown();
    }

    fn run_task(&self, task: &TaskRef) {
        match task.step() {
            StepOutcome::Finished => self.retire(task),
            StepOutcome::Busy => {}
            StepOutcome::Yielded(Step::Continue | Step::Done) => {}
            StepOutcome::Yielded(Step::Await(awaitable)) => self.suspend(task, awaitable),
            StepOutcome::Yielded(Step::Spawn(routine)) => match Task::<()>::run(self, routine) {
                Ok(child) => self.suspend(task, Awaitable::from(&child)),
                Err(error) => {
                    task.fault(error);
                    self.retire(task);
                }
            },
        }
    }

    fn retire(&self, task: &TaskRef) {
        self.core.registry.remove(task.id());
        self.core.registry.retire(task.clone());
    }

    /// Parks `task` until `awaitable` completes.
    fn suspend(&self, task: &TaskRef, awaitable: Awaitable) {
        if awaitable.is_completed() {
            return;
        }

        let id = task.id();
        if !self.core.registry.suspend(id) {
            return;
        }

        tracing::trace!(scheduler = self.core.id, task = %id, "task suspended");

        let core = Arc::downgrade(&self.core);
        awaitable.on_completed(Box::new(move || wake_weak(&core, id)));
    }

    /// Drains the post queue, at most `post_passes` batches.
    fn run_posts(&self) {
        for _ in 0..self.core.post_passes {
            if self.core.posts.is_empty() {
                return;
            }

            for callback in self.core.posts.take_batch() {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
                    self.report(SchedulerError::CallbackPanicked(panic_message(payload)));
                }
            }
        }
    }

    /// Reports errors of tasks that completed since the last sweep and
    /// that nothing observed.
    fn check_errors(&self) {
        for task in self.core.registry.take_retired() {
            let Some(error) = task.error() else {
                continue;
            };

            if error.is_handled() {
                continue;
            }

            error.mark_handled();
            tracing::warn!(scheduler = self.core.id, task = %task.id(), %error, "unhandled task error");

            let listeners = self.core.listeners.lock().unhandled.clone();
            for listener in listeners {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(&task))) {
                    self.report(SchedulerError::CallbackPanicked(panic_message(payload)));
                }
            }
        }
    }

    fn check_shutdown(&self) {
        let mut lifecycle = self.core.lifecycle.lock();

        if lifecycle.status != SchedulerStatus::Shutdown {
            return;
        }

        let status = if self.core.registry.is_idle() {
            SchedulerStatus::ShutdownCompleted
        } else {
            let elapsed = lifecycle
                .shutdown_started
                .map(|started| started.elapsed())
                .unwrap_or_default();

            if elapsed <= lifecycle.shutdown_timeout {
                return;
            }
            SchedulerStatus::ShutdownTimeout
        };

        lifecycle.status = status;
        let callback = lifecycle.shutdown_callback.take();
        drop(lifecycle);

        tracing::info!(scheduler = self.core.id, %status, "shutdown finished");

        if status == SchedulerStatus::ShutdownTimeout {
            self.cancel();
        }

        if let Some(callback) = callback {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(status))) {
                self.report(SchedulerError::CallbackPanicked(panic_message(payload)));
            }
        }
    }

    /// Starts a graceful shutdown.
    ///
    /// New tasks are refused from now on. Once every tracked task is done,
    /// or the shutdown timeout elapsed, a tick calls `callback` with the
    /// final status. Calling this again while shutting down, or after,
    /// calls `callback` at once with the current status.
    pub fn shutdown<F>(&self, callback: F)
    where
        F: FnOnce(SchedulerStatus) + Send + 'static,
    {
        let mut lifecycle = self.core.lifecycle.lock();

        if lifecycle.status != SchedulerStatus::Running {
            let status = lifecycle.status;
            drop(lifecycle);
            callback(status);
            return;
        }

        lifecycle.status = SchedulerStatus::Shutdown;
        lifecycle.shutdown_started = Some(Instant::now());
        lifecycle.shutdown_callback = Some(Box::new(callback));

        tracing::info!(
            scheduler = self.core.id,
            timeout = ?lifecycle.shutdown_timeout,
            "shutdown requested"
        );
    }

    /// Try-cancels every running and suspended task right away.
    ///
    /// Bodies that never check their token are unaffected.
    pub fn cancel(&self) {
        let mut tasks = self.core.registry.running();
        tasks.extend(self.core.registry.suspended());

        for task in tasks {
            task.try_cancel();
        }
    }

    fn report(&self, error: SchedulerError) {
        tracing::error!(scheduler = self.core.id, %error, "scheduler fault");

        let listeners = self.core.listeners.lock().internal.clone();
        for listener in listeners {
            let _ = catch_unwind(AssertUnwindSafe(|| listener(&error)));
        }
    }
}

fn wake(core: &SchedulerCore, id: TaskId) {
    if core.registry.resume(id) {
        tracing::trace!(scheduler = core.id, task = %id, "task resumed");
    }
}

fn wake_weak(core: &Weak<SchedulerCore>, id: TaskId) {
    if let Some(core) = core.upgrade() {
        wake(&core, id);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.core.id)
            .field("status", &self.status())
            .field("tick_count", &self.tick_count())
            .finish()
    }
}
