use parking_lot::Mutex;
use steptask::task::{Co, Step, from_fn};
use steptask::time::delay;
use steptask::{
    CancellationSource, CompletionHandle, Scheduler, SchedulerConfig, SchedulerError, SchedulerStatus, Task, TaskError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn endless(co: &mut Co<'_, ()>) -> Result<Step, TaskError> {
    co.throw_if_cancel_requested()?;
    Ok(Step::Continue)
}

/// A task that parks on `wait` until it is done.
fn waiter(scheduler: &Scheduler, wait: Task<()>) -> Task<()> {
    Task::run(
        scheduler,
        from_fn(move |_co: &mut Co<'_, ()>| {
            if wait.is_completed() {
                Ok(Step::Done)
            } else {
                Ok(Step::wait(&wait))
            }
        }),
    )
    .unwrap()
}

/// Ticks until the shutdown callback fired or two seconds passed.
fn drive_shutdown(scheduler: &Scheduler) -> Option<SchedulerStatus> {
    let reported = Arc::new(Mutex::new(None));
    scheduler.shutdown({
        let reported = reported.clone();
        move |status| *reported.lock() = Some(status)
    });

    let started = Instant::now();
    while reported.lock().is_none() && started.elapsed() < Duration::from_secs(2) {
        scheduler.tick();
        std::thread::sleep(Duration::from_millis(5));
    }

    let status = *reported.lock();
    status
}

#[test]
fn test_shutdown_times_out_on_slow_task() {
    let scheduler = Scheduler::builder()
        .shutdown_timeout(Duration::from_millis(50))
        .build();
    let _task = waiter(&scheduler, delay(&scheduler, Duration::from_millis(500)));

    let status = drive_shutdown(&scheduler);

    assert_eq!(status, Some(SchedulerStatus::ShutdownTimeout));
    assert_eq!(scheduler.status(), SchedulerStatus::ShutdownTimeout);
}

#[test]
fn test_shutdown_completes_when_tasks_finish() {
    let scheduler = Scheduler::builder()
        .shutdown_timeout(Duration::from_millis(500))
        .build();
    let task = waiter(&scheduler, delay(&scheduler, Duration::from_millis(10)));

    let status = drive_shutdown(&scheduler);

    assert_eq!(status, Some(SchedulerStatus::ShutdownCompleted));
    assert!(task.is_completed(), "The waiting task should have finished");
    assert!(!scheduler.has_any_task());
}

#[test]
fn test_idle_scheduler_shuts_down_on_next_tick() {
    let scheduler = Scheduler::new();
    let reported = Arc::new(Mutex::new(None));

    scheduler.shutdown({
        let reported = reported.clone();
        move |status| *reported.lock() = Some(status)
    });
    assert_eq!(scheduler.status(), SchedulerStatus::Shutdown);
    assert!(reported.lock().is_none(), "Callback should wait for a tick");

    scheduler.tick();
    assert_eq!(*reported.lock(), Some(SchedulerStatus::ShutdownCompleted));
}

#[test]
fn test_second_shutdown_calls_back_immediately() {
    let scheduler = Scheduler::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(Mutex::new(None));

    scheduler.shutdown({
        let first = first.clone();
        move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        }
    });
    scheduler.shutdown({
        let second = second.clone();
        move |status| *second.lock() = Some(status)
    });

    assert_eq!(*second.lock(), Some(SchedulerStatus::Shutdown));

    scheduler.tick_n(3);
    assert_eq!(first.load(Ordering::SeqCst), 1, "First callback should fire once");
}

#[test]
fn test_shutdown_refuses_new_tasks() {
    let scheduler = Scheduler::new();
    scheduler.shutdown(|_| {});

    let refused: Result<Task<()>, _> = Task::run(&scheduler, from_fn(endless));
    assert!(
        matches!(refused, Err(TaskError::InvalidOperation(_))),
        "Shutting down scheduler should refuse tasks"
    );
}

#[test]
fn test_unhandled_error_is_reported_once() {
    let scheduler = Scheduler::new();
    let reports = Arc::new(AtomicUsize::new(0));

    scheduler.on_unhandled_error({
        let reports = reports.clone();
        move |task| {
            assert!(task.is_faulted());
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    let task: Task<()> = Task::from_error(&scheduler, TaskError::msg("lost"));
    scheduler.tick_n(3);

    assert_eq!(reports.load(Ordering::SeqCst), 1, "Error should be reported exactly once");
    assert!(task.error().unwrap().is_handled(), "Reporting marks the error handled");
}

#[test]
fn test_error_of_running_task_is_reported() {
    let scheduler = Scheduler::new();
    let reports = Arc::new(AtomicUsize::new(0));
    scheduler.on_unhandled_error({
        let reports = reports.clone();
        move |_| {
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    let mut calls = 0;
    let _task: Task<()> = Task::run(
        &scheduler,
        from_fn(move |_co: &mut Co<'_, ()>| {
            calls += 1;
            if calls == 3 {
                return Err(TaskError::msg("late failure"));
            }
            Ok(Step::Continue)
        }),
    )
    .unwrap();

    scheduler.tick_n(5);
    assert_eq!(reports.load(Ordering::SeqCst), 1);
}

#[test]
fn test_on_error_suppresses_report() {
    let scheduler = Scheduler::new();
    let reports = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(0));

    scheduler.on_unhandled_error({
        let reports = reports.clone();
        move |_| {
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    Task::<()>::from_error(&scheduler, TaskError::msg("seen")).on_error({
        let observed = observed.clone();
        move |error| {
            observed.fetch_add(error.len(), Ordering::SeqCst);
        }
    });

    scheduler.tick_n(2);

    assert_eq!(observed.load(Ordering::SeqCst), 1, "on_error should see the error");
    assert_eq!(reports.load(Ordering::SeqCst), 0, "Observed errors are not reported");
}

#[test]
fn test_unobserved_cancellation_is_reported_once() {
    let scheduler = Scheduler::new();
    let reports = Arc::new(AtomicUsize::new(0));
    scheduler.on_unhandled_error({
        let reports = reports.clone();
        move |task| {
            assert!(task.is_canceled());
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    let handle = CompletionHandle::<()>::new(&scheduler);
    handle.set_canceled().unwrap();
    let canceled = Task::<()>::canceled(&scheduler);
    scheduler.tick_n(3);

    assert_eq!(reports.load(Ordering::SeqCst), 2, "Each cancellation should be reported exactly once");
    assert!(handle.task().error().unwrap().is_handled(), "Reporting marks the cancellation handled");
    assert!(canceled.error().unwrap().is_handled());
}

#[test]
fn test_reentrant_tick_is_reported() {
    let scheduler = Scheduler::builder().detect_reentrancy(true).build();
    let faults = Arc::new(Mutex::new(Vec::new()));

    scheduler.on_internal_error({
        let faults = faults.clone();
        move |error| faults.lock().push(error.clone())
    });

    let mut calls = 0;
    let task: Task<()> = Task::run(
        &scheduler,
        from_fn(move |co: &mut Co<'_, ()>| {
            calls += 1;
            if calls < 2 {
                return Ok(Step::Continue);
            }
            co.scheduler().tick();
            Ok(Step::Done)
        }),
    )
    .unwrap();

    scheduler.tick_n(2);

    assert!(task.is_completed(), "The outer tick should carry on");
    let faults = faults.lock();
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0], SchedulerError::ReentrantTick));
}

#[test]
fn test_reentrant_tick_is_silent_without_detection() {
    let scheduler = Scheduler::builder().detect_reentrancy(false).build();
    let faults = Arc::new(AtomicUsize::new(0));

    scheduler.on_internal_error({
        let faults = faults.clone();
        move |_| {
            faults.fetch_add(1, Ordering::SeqCst);
        }
    });

    let inner = scheduler.clone();
    scheduler.post(move || inner.tick());
    scheduler.tick();

    assert_eq!(faults.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.tick_count(), 1, "Nested tick should not count");
}

#[test]
fn test_panicking_callback_is_reported_and_others_run() {
    let scheduler = Scheduler::new();
    let faults = Arc::new(Mutex::new(Vec::new()));
    let ran = Arc::new(AtomicUsize::new(0));

    scheduler.on_internal_error({
        let faults = faults.clone();
        move |error| faults.lock().push(error.clone())
    });

    scheduler.post(|| panic!("bad callback"));
    scheduler.post({
        let ran = ran.clone();
        move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }
    });

    scheduler.tick();

    assert_eq!(ran.load(Ordering::SeqCst), 1, "Later callbacks should still run");
    let faults = faults.lock();
    assert!(matches!(&faults[..], [SchedulerError::CallbackPanicked(message)] if message.contains("bad callback")));
}

#[test]
fn test_diagnostics_track_tasks() {
    let scheduler = Scheduler::new();
    assert!(!scheduler.is_active());
    assert!(!scheduler.has_any_task());

    let gate = CompletionHandle::<()>::new(&scheduler);
    let task = waiter(&scheduler, gate.task());

    assert!(scheduler.is_active());
    assert_eq!(scheduler.pending_handles().len(), 1);

    scheduler.tick();
    assert!(!scheduler.is_active(), "The only task is suspended");
    assert!(scheduler.has_any_task());
    assert_eq!(scheduler.suspended_tasks()[0].id(), task.id());

    gate.set_result(()).unwrap();
    scheduler.tick();

    assert!(task.is_completed());
    assert!(!scheduler.has_any_task());
    assert!(scheduler.pending_handles().is_empty());
    assert_eq!(scheduler.tick_count(), 2);
}

#[test]
fn test_cancel_cancels_running_and_suspended_tasks() {
    let scheduler = Scheduler::new();

    let running: Task<()> =
        Task::run_cancellable(&scheduler, CancellationSource::new(), |_| from_fn(endless)).unwrap();

    let gate = CompletionHandle::<()>::new(&scheduler);
    let parked = Task::new(from_fn({
        let wait = gate.task();
        move |co: &mut Co<'_, ()>| {
            co.throw_if_cancel_requested()?;
            Ok(Step::wait(&wait))
        }
    }))
    .with_cancellation(CancellationSource::new());
    parked.start(&scheduler).unwrap();

    scheduler.tick();
    assert_eq!(scheduler.suspended_tasks().len(), 1);

    scheduler.cancel();
    assert!(running.is_canceled());
    assert!(parked.is_canceled());

    scheduler.tick();
    assert!(!scheduler.has_any_task(), "Canceled tasks should be retired");
}

#[test]
fn test_current_scheduler_is_set_during_tick() {
    let scheduler = Scheduler::new();
    let seen = Arc::new(Mutex::new(None));

    let mut calls = 0;
    let _task: Task<()> = Task::run(&scheduler, {
        let seen = seen.clone();
        from_fn(move |_co: &mut Co<'_, ()>| {
            calls += 1;
            if calls == 2 {
                *seen.lock() = Scheduler::current().map(|current| current.id());
                return Ok(Step::Done);
            }
            Ok(Step::Continue)
        })
    })
    .unwrap();

    assert!(Scheduler::current().is_none(), "No scheduler outside a tick");

    scheduler.tick_n(2);
    assert_eq!(*seen.lock(), Some(scheduler.id()));
}

#[test]
fn test_schedulers_are_independent() {
    let first = Scheduler::new();
    let second = Scheduler::new();

    let a = steptask::time::delay_frames(&first, 2);
    let b = steptask::time::delay_frames(&second, 2);

    first.tick_n(3);

    assert!(a.is_completed());
    assert!(!b.is_completed(), "Ticking one scheduler must not step another");
    assert_ne!(first.id(), second.id());
}

#[test]
fn test_spawn_outside_tick_uses_global_scheduler() {
    let task: Task<()> = steptask::task::spawn(from_fn(endless)).unwrap();

    assert_eq!(task.scheduler().map(|s| s.id()), Some(Scheduler::global().id()));
}

#[test]
fn test_config_from_json() {
    let config = SchedulerConfig::from_json(r#"{ "shutdown_timeout_ms": 250, "post_passes": 2 }"#).unwrap();
    assert_eq!(config.post_passes, 2);
    assert!(config.detect_reentrancy == SchedulerConfig::default().detect_reentrancy);

    let scheduler = Scheduler::with_config(config);
    assert_eq!(scheduler.shutdown_timeout(), Duration::from_millis(250));

    scheduler.set_shutdown_timeout(Duration::from_secs(1));
    assert_eq!(scheduler.shutdown_timeout(), Duration::from_secs(1));

    assert!(SchedulerConfig::from_json(r#"{ "post_passes": 0 }"#).is_err());
    assert!(SchedulerConfig::from_json("not json").is_err());
}
