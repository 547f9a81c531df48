use parking_lot::Mutex;
use steptask::task::{Co, Step, from_fn};
use steptask::{AggregateError, CancellationSource, Scheduler, Task, TaskError, TaskStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn counting_body(calls: Arc<AtomicUsize>, done_on: usize) -> impl steptask::task::Routine<()> {
    from_fn(move |_co: &mut Co<'_, ()>| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= done_on {
            Ok(Step::Done)
        } else {
            Ok(Step::Continue)
        }
    })
}

fn endless(co: &mut Co<'_, ()>) -> Result<Step, TaskError> {
    co.throw_if_cancel_requested()?;
    Ok(Step::Continue)
}

#[test]
fn test_body_finishing_on_fifth_call_completes_on_fifth_tick() {
    let scheduler = Scheduler::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let task = Task::run(&scheduler, counting_body(calls.clone(), 5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Start should run the first step");
    assert_eq!(task.status(), TaskStatus::Running);

    scheduler.tick_n(4);
    assert!(!task.is_completed(), "Task should still run after 4 ticks");

    scheduler.tick();
    assert_eq!(
        task.status(),
        TaskStatus::RanToCompletion,
        "Task should complete on tick 5"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 5, "Body should run exactly 5 times");
}

#[test]
fn test_body_finishing_at_once_is_terminal_after_start() {
    let scheduler = Scheduler::new();

    let task = Task::run(
        &scheduler,
        from_fn(|co: &mut Co<'_, i32>| {
            co.set_result(7);
            Ok(Step::Done)
        }),
    )
    .unwrap();

    assert_eq!(task.status(), TaskStatus::RanToCompletion);
    assert_eq!(task.result().unwrap(), 7, "Result should be readable without a tick");
}

#[test]
fn test_start_twice_is_rejected() {
    let scheduler = Scheduler::new();
    let task: Task<()> = Task::new(counting_body(Arc::new(AtomicUsize::new(0)), 3));

    assert_eq!(task.status(), TaskStatus::Created);
    assert!(task.start(&scheduler).is_ok());

    let second = task.start(&scheduler);
    assert!(
        matches!(second, Err(TaskError::InvalidOperation(_))),
        "Second start should be an invalid operation"
    );
}

#[test]
fn test_status_never_moves_backwards() {
    fn rank(status: TaskStatus) -> u8 {
        match status {
            TaskStatus::Created => 0,
            TaskStatus::Running => 1,
            _ => 2,
        }
    }

    let scheduler = Scheduler::new();
    let task: Task<()> = Task::new(counting_body(Arc::new(AtomicUsize::new(0)), 4));
    let mut seen = vec![task.status()];

    task.start(&scheduler).unwrap();
    for _ in 0..8 {
        seen.push(task.status());
        scheduler.tick();
    }
    seen.push(task.status());

    assert!(
        seen.windows(2).all(|pair| rank(pair[0]) <= rank(pair[1])),
        "Status went backwards: {seen:?}"
    );
    assert_eq!(task.status(), TaskStatus::RanToCompletion);
}

#[test]
fn test_error_from_body_faults_task() {
    let scheduler = Scheduler::new();
    let mut calls = 0;

    let task: Task<()> = Task::run(
        &scheduler,
        from_fn(move |_co: &mut Co<'_, ()>| {
            calls += 1;
            if calls == 2 {
                return Err(TaskError::msg("boom"));
            }
            Ok(Step::Continue)
        }),
    )
    .unwrap();

    scheduler.tick_n(2);

    assert_eq!(task.status(), TaskStatus::Faulted);
    let error = task.error().expect("Faulted task should carry errors");
    assert_eq!(error.first().unwrap().to_string(), "boom");
    assert!(task.result().is_err(), "Result of a faulted task should be an error");
}

#[test]
fn test_panic_in_body_faults_task() {
    let scheduler = Scheduler::new();
    let mut calls = 0;

    let task: Task<()> = Task::run(
        &scheduler,
        from_fn(move |_co: &mut Co<'_, ()>| {
            calls += 1;
            if calls == 2 {
                panic!("kaboom");
            }
            Ok(Step::Continue)
        }),
    )
    .unwrap();

    scheduler.tick_n(2);

    assert!(task.is_faulted(), "Panicking body should fault the task");
    match task.error().and_then(|e| e.first()) {
        Some(TaskError::Panicked(message)) => assert!(message.contains("kaboom")),
        other => panic!("Expected a panic error, got {other:?}"),
    }
}

#[test]
fn test_result_of_running_task_is_usage_error() {
    let scheduler = Scheduler::new();
    let task: Task<()> = Task::run(&scheduler, counting_body(Arc::new(AtomicUsize::new(0)), 3)).unwrap();

    assert!(
        matches!(task.result(), Err(TaskError::InvalidOperation(_))),
        "Reading a running task should fail"
    );
}

#[test]
fn test_continuation_on_terminal_task_runs_on_next_tick() {
    let scheduler = Scheduler::new();
    let ran = Arc::new(AtomicBool::new(false));

    let task = Task::from_result(&scheduler, 5);
    let doubled = task.continue_with({
        let ran = ran.clone();
        move |antecedent| {
            ran.store(true, Ordering::SeqCst);
            Ok(antecedent.result()? * 2)
        }
    });

    assert!(!ran.load(Ordering::SeqCst), "Continuation must not run inline");

    scheduler.tick();
    assert!(ran.load(Ordering::SeqCst), "Continuation should run on the next tick");
    assert_eq!(doubled.result().unwrap(), 10);
}

#[test]
fn test_continuations_run_in_registration_order() {
    let scheduler = Scheduler::new();
    let handle = steptask::CompletionHandle::<()>::new(&scheduler);
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 1..=3 {
        let order = order.clone();
        handle.task().continue_with(move |_| {
            order.lock().push(i);
            Ok(())
        });
    }

    handle.set_result(()).unwrap();
    scheduler.tick();

    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[test]
fn test_then_shares_the_error_aggregate() {
    let scheduler = Scheduler::new();
    let failed: Task<i32> = Task::from_error(&scheduler, TaskError::msg("nope"));
    let mapped = failed.then(|value| Ok(value + 1));

    scheduler.tick();

    assert!(mapped.is_faulted(), "Mapping a faulted task should fault");
    assert!(
        AggregateError::ptr_eq(&failed.error().unwrap(), &mapped.error().unwrap()),
        "The very same aggregate should be propagated"
    );
}

#[test]
fn test_canceled_antecedent_skips_continuation() {
    let scheduler = Scheduler::new();
    let ran = Arc::new(AtomicBool::new(false));

    let task: Task<()> = Task::run_cancellable(&scheduler, CancellationSource::new(), |_| from_fn(endless)).unwrap();
    scheduler.tick();

    let next = task.continue_with({
        let ran = ran.clone();
        move |_| {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    task.cancel().unwrap();
    assert!(task.is_canceled(), "Cancel should force a step that observes the token");

    scheduler.tick();
    assert!(next.is_canceled(), "Continuation of a canceled task should be canceled");
    assert!(!ran.load(Ordering::SeqCst), "Continuation body must be skipped");
}

#[test]
fn test_cancel_with_reason_is_visible_on_the_task() {
    let scheduler = Scheduler::new();
    let task: Task<()> = Task::run_cancellable(&scheduler, CancellationSource::new(), |_| from_fn(endless)).unwrap();
    scheduler.tick();

    task.cancel_with(TaskError::msg("stop")).unwrap();

    assert!(task.is_canceled());
    let error = task.error().and_then(|e| e.first()).unwrap();
    assert_eq!(error.cancel_reason().map(|r| r.to_string()), Some("stop".to_string()));
}

#[test]
fn test_cancel_without_source_is_error() {
    let scheduler = Scheduler::new();
    let task: Task<()> = Task::run(&scheduler, from_fn(endless)).unwrap();

    assert!(
        matches!(task.cancel(), Err(TaskError::InvalidOperation(_))),
        "Cancel needs a cancellation source"
    );

    task.try_cancel();
    scheduler.tick_n(3);
    assert_eq!(task.status(), TaskStatus::Running, "try_cancel should be a no-op");
}

#[test]
fn test_spawned_child_suspends_parent() {
    let scheduler = Scheduler::new();
    let child_calls = Arc::new(AtomicUsize::new(0));
    let mut spawned = false;

    let parent: Task<()> = Task::run(&scheduler, {
        let child_calls = child_calls.clone();
        from_fn(move |_co: &mut Co<'_, ()>| {
            if spawned {
                return Ok(Step::Done);
            }
            spawned = true;
            Ok(Step::spawn(counting_body(child_calls.clone(), 3)))
        })
    })
    .unwrap();

    scheduler.tick();
    assert_eq!(scheduler.suspended_tasks().len(), 1, "Parent should wait on the child");

    scheduler.tick();
    assert!(!parent.is_completed());

    scheduler.tick();
    assert_eq!(child_calls.load(Ordering::SeqCst), 3);
    assert!(parent.is_completed(), "Parent should resume once the child is done");
}

#[test]
fn test_awaiting_completed_task_does_not_suspend() {
    let scheduler = Scheduler::new();
    let done = Task::from_result(&scheduler, 1);
    let mut waited = false;

    let task: Task<()> = Task::run(
        &scheduler,
        from_fn(move |_co: &mut Co<'_, ()>| {
            if waited {
                return Ok(Step::Done);
            }
            waited = true;
            Ok(Step::wait(&done))
        }),
    )
    .unwrap();

    scheduler.tick();
    assert!(scheduler.suspended_tasks().is_empty(), "Nothing to wait for");

    scheduler.tick();
    assert!(task.is_completed());
}

#[test]
fn test_delay_frames_completes_after_frames_plus_one_ticks() {
    let scheduler = Scheduler::new();
    let task = steptask::time::delay_frames(&scheduler, 3);

    scheduler.tick_n(3);
    assert!(!task.is_completed());

    scheduler.tick();
    assert_eq!(task.status(), TaskStatus::RanToCompletion);

    let instant = steptask::time::delay_frames(&scheduler, 0);
    assert!(instant.is_completed(), "Zero frames should complete at once");
}

#[test]
fn test_factories_create_terminal_tasks() {
    let scheduler = Scheduler::new();

    assert_eq!(Task::from_result(&scheduler, 1).status(), TaskStatus::RanToCompletion);
    assert_eq!(Task::<()>::completed(&scheduler).status(), TaskStatus::RanToCompletion);
    assert!(Task::<()>::from_error(&scheduler, TaskError::msg("x")).is_faulted());
    assert!(Task::<()>::canceled(&scheduler).is_canceled());
}
