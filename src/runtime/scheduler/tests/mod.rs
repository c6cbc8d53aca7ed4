//! Scheduler 单元测试
//!
//! 测试任务状态、运行结果判定（完成、死锁、致命错误）和退出策略

use std::time::Duration;

use proptest::prelude::*;

use crate::runtime::channel::Channel;
use crate::runtime::scheduler::task::Task;
use crate::runtime::scheduler::{
    ExitPolicy, FatalError, Halt, RunOutcome, Scheduler, SchedulerConfig, TaskBuilder, TaskId,
    TaskStatus, EXIT_COMPLETED, EXIT_DEADLOCK, EXIT_FATAL,
};
use crate::util::logger;

fn main_exit_config() -> SchedulerConfig {
    SchedulerConfig {
        exit_policy: ExitPolicy::MainExit,
        ..SchedulerConfig::default()
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(7).to_string(), "Task(7)");
        assert_eq!(usize::from(TaskId::from(3)), 3);
    }

    #[test]
    fn test_task_status_from_u8() {
        for status in [TaskStatus::Runnable, TaskStatus::Blocked, TaskStatus::Finished] {
            assert_eq!(TaskStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn test_task_new_is_runnable() {
        let task = Task::new(TaskId(0), "worker");
        assert_eq!(task.name(), "worker");
        assert_eq!(task.status(), TaskStatus::Runnable);
        assert!(!task.is_finished());

        task.set_status(TaskStatus::Finished);
        assert!(task.is_finished());
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.exit_policy, ExitPolicy::WaitAll);
        assert_eq!(config.start_jitter_ms, 0);
        assert_eq!(config.stack_size, 256 * 1024);
    }

    #[test]
    fn test_exit_policy_parse() {
        assert_eq!("wait-all".parse::<ExitPolicy>(), Ok(ExitPolicy::WaitAll));
        assert_eq!("main-exit".parse::<ExitPolicy>(), Ok(ExitPolicy::MainExit));
        assert!("sometimes".parse::<ExitPolicy>().is_err());
        assert_eq!(ExitPolicy::MainExit.to_string(), "main-exit");
    }
}

#[cfg(test)]
mod outcome_tests {
    use super::*;

    #[test]
    fn test_empty_run_completes() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.run(), RunOutcome::Completed);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn test_run_is_idempotent() {
        let scheduler = Scheduler::new();
        let first = scheduler.run_main(|_| Ok(()));
        assert_eq!(first, RunOutcome::Completed);
        assert_eq!(scheduler.run(), first);
        assert_eq!(scheduler.outcome(), Some(first));
    }

    #[test]
    fn test_fan_in_sum() {
        logger::init_test();
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<i64>::unbuffered();
            for part in [vec![7, 2, 8], vec![-9, 4, 0]] {
                let c = c.clone();
                cx.spawn(move |cx| c.send(cx, part.iter().sum()))?;
            }
            let mut got = vec![c.recv(cx)?, c.recv(cx)?];
            got.sort();
            assert_eq!(got, vec![Some(-5), Some(17)]);
            Ok(())
        });
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(outcome.exit_code(), EXIT_COMPLETED);
        assert_eq!(scheduler.stats().snapshot().tasks_spawned, 3);
    }

    #[test]
    fn test_lonely_receive_deadlocks() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            Channel::<()>::unbuffered().recv(cx)?;
            Ok(())
        });

        let RunOutcome::Deadlock(report) = &outcome else {
            panic!("expected deadlock, got {:?}", outcome);
        };
        assert_eq!(report.blocked().len(), 1);
        let main = report.find("main").expect("main is blocked");
        assert_eq!(main.op, crate::runtime::ChannelOp::Receive);
        assert!(report.to_string().starts_with("all tasks are asleep - deadlock!"));
        assert_eq!(outcome.exit_code(), EXIT_DEADLOCK);
    }

    #[test]
    fn test_deadlock_lists_tasks_in_blocking_order() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<i64>::unbuffered();
            let rx = c.clone();
            let worker = cx.spawn_with(TaskBuilder::new().name("waiter"), move |cx| {
                rx.recv(cx)?;
                Ok(())
            })?;
            while worker.status() != TaskStatus::Blocked {
                cx.sleep(Duration::from_millis(1))?;
            }
            Channel::<i64>::unbuffered().recv(cx)?;
            Ok(())
        });

        let report = match outcome {
            RunOutcome::Deadlock(report) => report,
            other => panic!("expected deadlock, got {:?}", other),
        };
        let names: Vec<&str> = report.blocked().iter().map(|b| b.task.name.as_str()).collect();
        assert_eq!(names, vec!["waiter", "main"]);
        assert_eq!(report.first().map(|b| b.task.name.as_str()), Some("waiter"));
    }

    #[test]
    fn test_sleeping_task_is_not_deadlocked() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<&'static str>::unbuffered();
            let tx = c.clone();
            cx.spawn(move |cx| {
                cx.sleep(Duration::from_millis(30))?;
                tx.send(cx, "Hello")
            })?;
            assert_eq!(c.recv(cx)?, Some("Hello"));
            Ok(())
        });
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_send_on_closed_channel_is_fatal() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<i64>::bounded(4);
            c.close(cx)?;
            c.send(cx, 1)
        });

        match &outcome {
            RunOutcome::Fatal(FatalError::ClosedChannelSend { task, .. }) => {
                assert_eq!(task.name, "main");
            }
            other => panic!("expected closed-channel send, got {:?}", other),
        }
        assert_eq!(outcome.exit_code(), EXIT_FATAL);
    }

    #[test]
    fn test_double_close_is_fatal() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<()>::unbuffered();
            c.close(cx)?;
            c.close(cx)
        });
        assert!(matches!(
            outcome,
            RunOutcome::Fatal(FatalError::DoubleClose { .. })
        ));
    }

    #[test]
    fn test_panic_is_fatal() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            cx.spawn_with(TaskBuilder::new().name("boom"), |_| panic!("kaboom"))?;
            cx.sleep(Duration::from_secs(5))
        });

        match outcome {
            RunOutcome::Fatal(FatalError::TaskPanicked { task, message }) => {
                assert_eq!(task.name, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[test]
    fn test_fatal_halts_blocked_tasks() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let never = Channel::<()>::unbuffered();
            let rx = never.clone();
            let blocked = cx.spawn(move |cx| match rx.recv(cx) {
                Err(Halt::Aborted) => Ok(()),
                other => panic!("expected abort, got {:?}", other),
            })?;
            while blocked.status() != TaskStatus::Blocked {
                cx.sleep(Duration::from_millis(1))?;
            }
            let c = Channel::<()>::unbuffered();
            c.close(cx)?;
            c.close(cx)
        });
        assert!(matches!(outcome, RunOutcome::Fatal(FatalError::DoubleClose { .. })));
        assert_eq!(scheduler.live_tasks(), 0);
    }
}

#[cfg(test)]
mod exit_policy_tests {
    use super::*;

    fn parked_workers(
        scheduler: &Scheduler,
        workers: usize,
    ) -> RunOutcome {
        scheduler.run_main(move |cx| {
            let done = Channel::<bool>::unbuffered();
            let ready = Channel::<usize>::unbuffered();
            for n in 0..workers {
                let (done, ready) = (done.clone(), ready.clone());
                cx.spawn(move |cx| {
                    ready.send(cx, n)?;
                    done.recv(cx)?;
                    Ok(())
                })?;
            }
            for _ in 0..workers {
                ready.recv(cx)?;
            }
            Ok(())
        })
    }

    #[test]
    fn test_wait_all_reports_leftover_workers() {
        let scheduler = Scheduler::new();
        let outcome = parked_workers(&scheduler, 2);
        match outcome {
            RunOutcome::Deadlock(report) => assert_eq!(report.blocked().len(), 2),
            other => panic!("expected deadlock, got {:?}", other),
        }
    }

    #[test]
    fn test_main_exit_abandons_workers() {
        let scheduler = Scheduler::with_config(main_exit_config());
        let outcome = parked_workers(&scheduler, 2);
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn test_main_exit_still_detects_deadlock_before_exit() {
        let scheduler = Scheduler::with_config(main_exit_config());
        let outcome = scheduler.run_main(|cx| {
            Channel::<()>::unbuffered().recv(cx)?;
            Ok(())
        });
        assert!(outcome.is_deadlock());
    }
}

#[cfg(test)]
mod spawn_tests {
    use super::*;

    #[test]
    fn test_spawn_before_run() {
        let scheduler = Scheduler::new();
        let c = Channel::<i64>::unbuffered();

        let tx = c.clone();
        scheduler.spawn(move |cx| tx.send(cx, 5)).expect("spawn");
        let rx = c.clone();
        // The sender may already be parked; the run must not end before
        // `run` is called.
        scheduler
            .spawn(move |cx| {
                assert_eq!(rx.recv(cx)?, Some(5));
                Ok(())
            })
            .expect("spawn");

        assert_eq!(scheduler.run(), RunOutcome::Completed);
    }

    #[test]
    fn test_nested_spawn() {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<String>::unbuffered();
            let tx = c.clone();
            cx.spawn(move |cx| {
                let inner = tx.clone();
                cx.spawn_with(TaskBuilder::new().name("grandchild"), move |cx| {
                    inner.send(cx, cx.name().to_string())
                })?;
                Ok(())
            })?;
            assert_eq!(c.recv(cx)?.as_deref(), Some("grandchild"));
            Ok(())
        });
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(scheduler.stats().snapshot().tasks_finished, 3);
    }

    #[test]
    fn test_spawn_after_run_is_refused() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.run(), RunOutcome::Completed);
        assert!(scheduler.spawn(|_| Ok(())).is_err());
    }

    #[test]
    fn test_start_jitter_keeps_outcome() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            start_jitter_ms: 3,
            ..SchedulerConfig::default()
        });
        let outcome = scheduler.run_main(|cx| {
            let c = Channel::<usize>::unbuffered();
            for n in 0..4 {
                let c = c.clone();
                cx.spawn(move |cx| c.send(cx, n))?;
            }
            let mut total = 0;
            for _ in 0..4 {
                total += c.recv(cx)?.unwrap_or_default();
            }
            assert_eq!(total, 6);
            Ok(())
        });
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_stats_count_handoffs_and_peak() {
        let scheduler = Scheduler::new();
        scheduler.run_main(|cx| {
            let c = Channel::<u8>::unbuffered();
            let tx = c.clone();
            cx.spawn(move |cx| tx.send(cx, 1))?;
            c.recv(cx)?;
            Ok(())
        });

        let stats = scheduler.stats().snapshot();
        assert_eq!(stats.tasks_spawned, 2);
        assert_eq!(stats.tasks_finished, 2);
        assert_eq!(stats.handoffs, 1);
        assert!(stats.peak_live >= 1 && stats.peak_live <= 2);
        assert_eq!(stats.tasks_abandoned, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every value sent by any number of senders is received exactly once.
    #[test]
    fn prop_fan_in_delivers_every_value(values in prop::collection::vec(-1000i64..1000, 0..12)) {
        let expected: i64 = values.iter().sum();
        let count = values.len();
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(move |cx| {
            let c = Channel::<i64>::unbuffered();
            for v in values {
                let c = c.clone();
                cx.spawn(move |cx| c.send(cx, v))?;
            }
            let mut total = 0;
            for _ in 0..count {
                total += c.recv(cx)?.unwrap_or_default();
            }
            assert_eq!(total, expected);
            Ok(())
        });
        prop_assert_eq!(outcome, RunOutcome::Completed);
    }

    /// One receive too many always deadlocks, whatever the capacity.
    #[test]
    fn prop_extra_receive_deadlocks(senders in 0usize..6, capacity in 0usize..4) {
        let scheduler = Scheduler::new();
        let outcome = scheduler.run_main(move |cx| {
            let c = Channel::<usize>::bounded(capacity);
            for n in 0..senders {
                let c = c.clone();
                cx.spawn(move |cx| c.send(cx, n))?;
            }
            for _ in 0..=senders {
                c.recv(cx)?;
            }
            Ok(())
        });
        match outcome {
            RunOutcome::Deadlock(report) => {
                prop_assert_eq!(report.blocked().len(), 1);
                prop_assert!(report.find("main").is_some());
            }
            other => prop_assert!(false, "expected deadlock, got {:?}", other),
        }
    }
}
