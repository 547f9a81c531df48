use super::command::Command;
use super::entry::TimerEntry;
use crate::error::panic_message;

use once_cell::sync::Lazy;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SendError, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

/// Process-wide timer driver, started on first use.
static DRIVER: Lazy<DriverHandle> = Lazy::new(TimerDriver::start);

/// The timer thread.
///
/// The driver owns a min-heap of pending deadlines and blocks on its
/// command channel until either a new command arrives or the earliest
/// deadline expires. Expired callbacks run on the timer thread itself, so
/// they must only signal (complete a handle, cancel a source) and never
/// step tasks.
pub(crate) struct TimerDriver {
    receiver: Receiver<Command>,
    timers: BinaryHeap<TimerEntry>,
}

/// Cloneable sender side of the driver's command channel.
#[derive(Clone)]
pub(crate) struct DriverHandle {
    sender: Sender<Command>,
}

impl DriverHandle {
    pub(crate) fn send(&self, cmd: Command) -> Result<(), SendError<Command>> {
        self.sender.send(cmd)
    }

    /// Asks the driver thread to exit. Pending timers never fire.
    #[allow(dead_code)]
    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

impl TimerDriver {
    /// Starts a timer thread and returns a handle to it.
    ///
    /// If the thread cannot be spawned the receiver is dropped with it, so
    /// every send through the handle fails and timers are dropped.
    pub(crate) fn start() -> DriverHandle {
        let (sender, receiver) = channel();

        let spawned = thread::Builder::new()
            .name("steptask-timer".into())
            .spawn(move || {
                tracing::debug!("timer thread started");
                TimerDriver {
                    receiver,
                    timers: BinaryHeap::new(),
                }
                .run();
                tracing::debug!("timer thread stopped");
            });

        if let Err(error) = spawned {
            tracing::error!(%error, "failed to spawn the timer thread");
        }

        DriverHandle { sender }
    }

    /// Main loop.
    ///
    /// 1. Wait for a command, at most until the earliest deadline
    /// 2. Drain any further queued commands
    /// 3. Fire expired timers
    fn run(&mut self) {
        loop {
            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            let first = match timeout {
                Some(timeout) => match self.receiver.recv_timeout(timeout) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                },
                None => match self.receiver.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => return,
                },
            };

            let pending = first.into_iter().chain(std::iter::from_fn(|| self.receiver.try_recv().ok()));
            let commands: Vec<Command> = pending.collect();

            for cmd in commands {
                match cmd {
                    Command::SetTimer {
                        deadline,
                        callback,
                        cancelled,
                    } => {
                        self.timers.push(TimerEntry {
                            deadline,
                            callback,
                            cancelled,
                        });
                    }
                    Command::Shutdown => return,
                }
            }

            self.fire_expired();
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let Some(timer) = self.timers.pop() else {
                break;
            };

            if timer.cancelled.load(Ordering::Acquire) {
                continue;
            }

            if let Err(payload) = catch_unwind(AssertUnwindSafe(timer.callback)) {
                tracing::error!(panic = %panic_message(payload), "timer callback panicked");
            }
        }
    }
}

/// A registered timer. Dropping the guard does **not** cancel it.
#[derive(Debug, Clone)]
pub struct TimerGuard {
    cancelled: Arc<AtomicBool>,
}

impl TimerGuard {
    /// Prevents the callback from running if it has not fired yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Runs `callback` on the timer thread once `delay` has elapsed.
///
/// The callback runs off the scheduler thread. Use it to signal
/// thread-safe primitives such as a [`CompletionHandle`] or a
/// [`CancellationSource`].
///
/// [`CompletionHandle`]: crate::task::CompletionHandle
/// [`CancellationSource`]: crate::cancel::CancellationSource
pub fn after<F>(delay: Duration, callback: F) -> TimerGuard
where
    F: FnOnce() + Send + 'static,
{
    schedule_on(&DRIVER, delay, callback)
}

pub(crate) fn schedule_on<F>(driver: &DriverHandle, delay: Duration, callback: F) -> TimerGuard
where
    F: FnOnce() + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let deadline = Instant::now()
        .checked_add(delay)
        .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64));

    let sent = driver.send(Command::SetTimer {
        deadline,
        callback: Box::new(callback),
        cancelled: cancelled.clone(),
    });

    if sent.is_err() {
        tracing::error!("timer thread is gone; timer dropped");
        cancelled.store(true, Ordering::Release);
    }

    TimerGuard { cancelled }
}
