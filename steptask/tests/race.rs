use steptask::task::{Co, Step, from_fn};
use steptask::time::{delay_frames, delay_with};
use steptask::tools::{first, first_of, when_any};
use steptask::{CancellationSource, CancellationToken, CompletionHandle, Scheduler, Task, TaskError, TaskStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A cancellable task that never finishes on its own.
fn stubborn(scheduler: &Scheduler) -> Task<()> {
    Task::run_cancellable(scheduler, CancellationSource::new(), |_| {
        from_fn(|co: &mut Co<'_, ()>| {
            co.throw_if_cancel_requested()?;
            Ok(Step::Continue)
        })
    })
    .unwrap()
}

#[test]
fn test_when_any_returns_first_finished_task() {
    let scheduler = Scheduler::new();
    let slow = CompletionHandle::<i32>::new(&scheduler);
    let fast = CompletionHandle::<i32>::new(&scheduler);

    let any = when_any(&scheduler, &[slow.task(), fast.task()]).unwrap();

    fast.set_result(2).unwrap();
    scheduler.tick();

    let winner = any.result().unwrap();
    assert_eq!(winner.id(), fast.task().id());
    assert_eq!(winner.result().unwrap(), 2);

    slow.set_result(1).unwrap();
    scheduler.tick();
    assert_eq!(any.result().unwrap().id(), fast.task().id(), "Winner must not change");
}

#[test]
fn test_when_any_reports_failed_winner_as_result() {
    let scheduler = Scheduler::new();
    let failed: Task<i32> = Task::from_error(&scheduler, TaskError::msg("first to fail"));
    let pending = CompletionHandle::<i32>::new(&scheduler);

    let any = when_any(&scheduler, &[pending.task(), failed.clone()]).unwrap();
    scheduler.tick();

    assert_eq!(any.status(), TaskStatus::RanToCompletion);
    assert!(any.result().unwrap().is_faulted());
}

#[test]
fn test_empty_race_is_rejected() {
    let scheduler = Scheduler::new();
    let none: [Task<()>; 0] = [];

    assert!(matches!(when_any(&scheduler, &none), Err(TaskError::InvalidArgument(_))));
    assert!(matches!(first(&scheduler, &none, None), Err(TaskError::InvalidArgument(_))));
}

#[test]
fn test_first_cancels_losers() {
    let scheduler = Scheduler::new();
    let winner = delay_frames(&scheduler, 2);
    let loser_a = stubborn(&scheduler);
    let loser_b = stubborn(&scheduler);

    let race = first(&scheduler, &[winner.clone(), loser_a.clone(), loser_b.clone()], None).unwrap();

    scheduler.tick_n(2);
    assert!(!race.is_completed());

    scheduler.tick();
    assert_eq!(race.status(), TaskStatus::RanToCompletion);
    assert!(loser_a.is_canceled(), "Losers should be cancelled once a winner is known");
    assert!(loser_b.is_canceled());
}

#[test]
fn test_first_propagates_winner_failure() {
    let scheduler = Scheduler::new();
    let failing = CompletionHandle::<i32>::new(&scheduler);
    let other = CompletionHandle::<i32>::new(&scheduler);

    let race = first(&scheduler, &[failing.task(), other.task()], None).unwrap();

    failing.set_error(TaskError::msg("lost connection")).unwrap();
    scheduler.tick();

    assert!(race.is_faulted(), "A failing winner faults the race");
    other.set_result(1).unwrap();
    scheduler.tick();
    assert!(race.is_faulted());
}

#[test]
fn test_first_is_canceled_by_its_source() {
    let scheduler = Scheduler::new();
    let source = CancellationSource::new();
    let a = delay_with(&scheduler, Duration::from_secs(30), source.token());
    let b = delay_with(&scheduler, Duration::from_secs(30), source.token());

    let race = first(&scheduler, &[a.clone(), b.clone()], Some(source.clone())).unwrap();
    source.cancel();

    assert!(race.is_canceled(), "Cancelling the source cancels the race");
    assert!(a.is_canceled());
    assert!(b.is_canceled());
}

#[test]
fn test_first_of_cancels_the_shared_token() {
    let scheduler = Scheduler::new();
    let gate = CompletionHandle::<u8>::new(&scheduler);
    let slow_slot = Arc::new(Mutex::new(None));

    let starters: Vec<Box<dyn FnOnce(CancellationToken) -> Task<u8>>> = vec![
        Box::new({
            let gate = gate.task();
            move |_token: CancellationToken| gate
        }),
        Box::new({
            let scheduler = scheduler.clone();
            let slow_slot = slow_slot.clone();
            move |token: CancellationToken| {
                let slow = delay_with(&scheduler, Duration::from_secs(30), token).then(|()| Ok(0));
                *slow_slot.lock() = Some(slow.clone());
                slow
            }
        }),
    ];

    let race = first_of(&scheduler, starters).unwrap();

    gate.set_result(7).unwrap();
    scheduler.tick();

    assert_eq!(race.result().unwrap(), 7);

    scheduler.tick();
    let slow = slow_slot.lock().clone().unwrap();
    assert!(slow.is_canceled(), "The losing contender should see its token cancelled");
}

#[test]
fn test_first_does_not_report_losers_it_cancelled() {
    let scheduler = Scheduler::new();
    let reports = Arc::new(AtomicUsize::new(0));
    scheduler.on_unhandled_error({
        let reports = reports.clone();
        move |_| {
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    let gate = CompletionHandle::<u8>::new(&scheduler);
    let source = CancellationSource::new();
    let loser = delay_with(&scheduler, Duration::from_secs(30), source.token()).then(|()| Ok(0));

    let race = first(&scheduler, &[gate.task(), loser.clone()], Some(source)).unwrap();

    gate.set_result(3).unwrap();
    scheduler.tick_n(3);

    assert_eq!(race.result().unwrap(), 3);
    assert!(loser.is_canceled());
    assert_eq!(reports.load(Ordering::SeqCst), 0, "Cancelled losers were observed by the race");
}
