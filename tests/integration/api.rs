//! Public API: programs written the way a library user would.

use std::time::Duration;

use chanlab::{
    Channel, ExitPolicy, FatalError, Halt, RunOutcome, Scheduler, SchedulerConfig, TaskBuilder,
};

#[test]
fn test_ping_pong() {
    let scheduler = Scheduler::new();
    let outcome = scheduler.run_main(|cx| {
        let ping = Channel::<u32>::unbuffered();
        let pong = Channel::<u32>::unbuffered();

        let (rx, tx) = (ping.clone(), pong.clone());
        cx.spawn_with(TaskBuilder::new().name("ponger"), move |cx| {
            while let Some(n) = rx.recv(cx)? {
                tx.send(cx, n + 1)?;
            }
            Ok(())
        })?;

        let mut n = 0;
        for _ in 0..100 {
            ping.send(cx, n)?;
            n = pong.recv(cx)?.unwrap_or_default();
        }
        assert_eq!(n, 100);
        ping.close(cx)
    });
    assert_eq!(outcome, RunOutcome::Completed);
}

#[test]
fn test_pipeline_drains_on_close() {
    let scheduler = Scheduler::new();
    let outcome = scheduler.run_main(|cx| {
        let numbers = Channel::<u64>::bounded(4);
        let squares = Channel::<u64>::unbuffered();

        let tx = numbers.clone();
        cx.spawn(move |cx| {
            for n in 1..=10 {
                tx.send(cx, n)?;
            }
            tx.close(cx)
        })?;

        let (rx, out) = (numbers.clone(), squares.clone());
        cx.spawn(move |cx| {
            while let Some(n) = rx.recv(cx)? {
                out.send(cx, n * n)?;
            }
            out.close(cx)
        })?;

        let mut total = 0;
        while let Some(sq) = squares.recv(cx)? {
            total += sq;
        }
        assert_eq!(total, 385);
        Ok(())
    });
    assert_eq!(outcome, RunOutcome::Completed);
}

#[test]
fn test_forgotten_close_deadlocks_pipeline() {
    let scheduler = Scheduler::new();
    let outcome = scheduler.run_main(|cx| {
        let numbers = Channel::<u64>::unbuffered();
        let tx = numbers.clone();
        cx.spawn(move |cx| {
            for n in 0..3 {
                tx.send(cx, n)?;
            }
            Ok(())
        })?;
        while numbers.recv(cx)?.is_some() {}
        Ok(())
    });

    let report = match outcome {
        RunOutcome::Deadlock(report) => report,
        other => panic!("expected deadlock, got {:?}", other),
    };
    assert_eq!(report.blocked().len(), 1);
    assert_eq!(report.blocked()[0].task.name, "main");
}

#[test]
fn test_blocked_task_sees_deadlock_halt() {
    let scheduler = Scheduler::new();
    let seen = Channel::<()>::unbuffered();
    let rx = seen.clone();
    let outcome = scheduler.run_main(move |cx| {
        let err = rx.recv(cx).unwrap_err();
        assert_eq!(err, Halt::Deadlock);
        Err(err)
    });
    assert!(outcome.is_deadlock());
}

#[test]
fn test_main_exit_policy_from_config() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        exit_policy: ExitPolicy::MainExit,
        ..SchedulerConfig::default()
    });
    let outcome = scheduler.run_main(|cx| {
        let forever = Channel::<()>::unbuffered();
        cx.spawn(move |cx| {
            forever.recv(cx)?;
            Ok(())
        })?;
        cx.sleep(Duration::from_millis(5))
    });
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(scheduler.stats().snapshot().tasks_abandoned, 1);
}

#[test]
fn test_fatal_error_serializes_with_kind() {
    let scheduler = Scheduler::new();
    let outcome = scheduler.run_main(|cx| {
        let c = Channel::<()>::unbuffered();
        c.close(cx)?;
        c.close(cx)
    });
    assert!(matches!(
        &outcome,
        RunOutcome::Fatal(FatalError::DoubleClose { .. })
    ));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "fatal");
    assert_eq!(json["detail"]["kind"], "double_close");
    assert_eq!(json["detail"]["task"]["name"], "main");
}
