//! Shared run state: live-task accounting, the blocked-task registry and
//! the outcome of the run.
//!
//! Lock order is always channel state, then [`RunShared::state`], then a
//! waiter slot. A task is registered as blocked while its channel lock is
//! held, and whoever resolves a waiter removes it from the registry before
//! releasing that same lock, so `blocked.len() == live` means nothing is
//! left that could wake anyone.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::context::TaskContext;
use super::outcome::{BlockedTask, DeadlockReport, FatalError, Halt, RunOutcome, TaskRef, TaskResult};
use super::task::{Task, TaskBuilder, TaskHandle, TaskId, TaskIdGenerator, TaskStatus};
use super::{ExitPolicy, SchedulerConfig, SchedulerStats};
use crate::runtime::channel::{ChannelId, ChannelOp};

/// Something parked that can be woken with a halt when the run ends.
pub(crate) trait Interrupt: Send + Sync {
    fn interrupt(
        &self,
        halt: Halt,
    );
}

/// Registry entry for a parked task.
struct BlockedEntry {
    task: Arc<Task>,
    channel: ChannelId,
    op: ChannelOp,
    waiter: Arc<dyn Interrupt>,
}

/// Mutable state of one run, guarded by [`RunShared::state`].
pub(crate) struct RunState {
    /// Tasks spawned and not yet finished.
    live: usize,
    /// The driver counts as a live participant until `run()` is called.
    setup_hold: bool,
    /// Parked tasks in the order they blocked.
    blocked: IndexMap<TaskId, BlockedEntry>,
    outcome: Option<RunOutcome>,
    threads: Vec<JoinHandle<()>>,
    tasks: Vec<Arc<Task>>,
    main: Option<TaskId>,
    ids: TaskIdGenerator,
}

impl RunState {
    fn new() -> Self {
        Self {
            live: 0,
            setup_hold: true,
            blocked: IndexMap::new(),
            outcome: None,
            threads: Vec::new(),
            tasks: Vec::new(),
            main: None,
            ids: TaskIdGenerator::new(),
        }
    }
}

/// State shared between the scheduler, every task context and every
/// blocking operation.
pub(crate) struct RunShared {
    pub(crate) config: SchedulerConfig,
    pub(crate) stats: SchedulerStats,
    state: Mutex<RunState>,
    /// Notified whenever the outcome is decided.
    changed: Condvar,
}

impl std::fmt::Debug for RunShared {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RunShared")
            .field("config", &self.config)
            .field("live", &state.live)
            .field("blocked", &state.blocked.len())
            .field("outcome", &state.outcome)
            .finish()
    }
}

impl RunShared {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            stats: SchedulerStats::default(),
            state: Mutex::new(RunState::new()),
            changed: Condvar::new(),
        }
    }

    /// Fail fast once the run has an outcome.
    pub(crate) fn ensure_running(&self) -> Result<(), Halt> {
        match &self.state.lock().outcome {
            Some(outcome) => Err(outcome.halt()),
            None => Ok(()),
        }
    }

    /// The halt for a task that notices the run is over.
    pub(crate) fn halt(&self) -> Halt {
        self.state
            .lock()
            .outcome
            .as_ref()
            .map(RunOutcome::halt)
            .unwrap_or(Halt::Aborted)
    }

    pub(crate) fn outcome(&self) -> Option<RunOutcome> {
        self.state.lock().outcome.clone()
    }

    pub(crate) fn live_tasks(&self) -> usize {
        self.state.lock().live
    }

    pub(crate) fn blocked_tasks(&self) -> usize {
        self.state.lock().blocked.len()
    }

    /// Register `task` as parked on `channel`. Called with the channel lock
    /// held. May decide the run is deadlocked, in which case `waiter` has
    /// already been halted when this returns.
    pub(crate) fn park(
        &self,
        task: &Arc<Task>,
        channel: ChannelId,
        op: ChannelOp,
        waiter: Arc<dyn Interrupt>,
    ) -> Result<(), Halt> {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.outcome {
            return Err(outcome.halt());
        }

        task.set_status(TaskStatus::Blocked);
        state.blocked.insert(
            task.id(),
            BlockedEntry {
                task: task.clone(),
                channel,
                op,
                waiter,
            },
        );
        self.stats.record_park();
        debug!(task = %task.id(), %channel, %op, "task parked");

        self.detect_deadlock(&mut state);
        Ok(())
    }

    /// Remove a parked task from the registry before handing it a result.
    /// Called with the channel lock held.
    pub(crate) fn unpark(
        &self,
        id: TaskId,
    ) -> Result<(), Halt> {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.outcome {
            return Err(outcome.halt());
        }
        if let Some(entry) = state.blocked.shift_remove(&id) {
            entry.task.set_status(TaskStatus::Runnable);
        }
        Ok(())
    }

    /// Record a fatal error raised on behalf of `culprit` and end the run.
    /// Returns the halt the culprit should propagate.
    pub(crate) fn fail(
        &self,
        culprit: Option<TaskId>,
        err: FatalError,
    ) -> Halt {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.outcome {
            return outcome.halt();
        }
        self.terminate(&mut state, RunOutcome::Fatal(err.clone()), culprit);
        Halt::Fatal(err)
    }

    /// Sleep for `duration`, waking early if the run ends.
    pub(crate) fn sleep(
        &self,
        duration: Duration,
    ) -> Result<(), Halt> {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Err(outcome.halt());
            }
            if Instant::now() >= deadline {
                return Ok(());
            }
            self.changed.wait_until(&mut state, deadline);
        }
    }

    /// Start a task on its own thread.
    pub(crate) fn spawn<F>(
        self: &Arc<Self>,
        builder: TaskBuilder,
        main: bool,
        body: F,
    ) -> Result<TaskHandle, Halt>
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.outcome {
            return Err(outcome.halt());
        }

        let id = state.ids.next();
        let name = builder.name.unwrap_or_else(|| {
            if main {
                "main".to_string()
            } else {
                format!("task-{}", id.inner())
            }
        });
        let task = Arc::new(Task::new(id, name));

        let cx = TaskContext::new(task.clone(), self.clone());
        let jitter = Duration::from_millis(self.config.start_jitter_ms);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.config.thread_name_prefix, id.inner()))
            .stack_size(builder.stack_size.unwrap_or(self.config.stack_size))
            .spawn(move || run_task(cx, jitter, body));

        match spawned {
            Ok(handle) => {
                state.live += 1;
                state.threads.push(handle);
                state.tasks.push(task.clone());
                if main {
                    state.main = Some(id);
                }
                self.stats.record_spawned();
                self.stats.update_peak_live(state.live);
                debug!(task = %id, name = task.name(), "task spawned");
                Ok(TaskHandle::new(task))
            }
            Err(e) => {
                task.set_status(TaskStatus::Finished);
                let err = FatalError::SpawnFailed {
                    name: task.name().to_string(),
                    reason: e.to_string(),
                };
                self.terminate(&mut state, RunOutcome::Fatal(err.clone()), None);
                Err(Halt::Fatal(err))
            }
        }
    }

    /// Account for a task whose body has returned.
    fn finish(
        &self,
        task: &Arc<Task>,
    ) {
        let mut state = self.state.lock();
        state.live -= 1;
        task.set_status(TaskStatus::Finished);
        self.stats.record_finished();
        debug!(task = %task.id(), "task finished");

        if state.outcome.is_some() {
            return;
        }

        let main_exited = state.main == Some(task.id());
        if main_exited && self.config.exit_policy == ExitPolicy::MainExit {
            let abandoned: Vec<String> = state
                .tasks
                .iter()
                .filter(|t| !t.is_finished())
                .map(|t| TaskRef::from(t.as_ref()).to_string())
                .collect();
            if !abandoned.is_empty() {
                self.stats.record_abandoned(abandoned.len());
                warn!(
                    count = abandoned.len(),
                    tasks = %abandoned.join(", "),
                    "main exited, abandoning unfinished tasks"
                );
            }
            self.terminate(&mut state, RunOutcome::Completed, None);
        } else if state.live == 0 && !state.setup_hold {
            self.terminate(&mut state, RunOutcome::Completed, None);
        } else {
            self.detect_deadlock(&mut state);
        }
    }

    /// The driver has finished spawning; from now on the run can end.
    pub(crate) fn release_setup(&self) {
        let mut state = self.state.lock();
        if !state.setup_hold {
            return;
        }
        state.setup_hold = false;
        if state.outcome.is_some() {
            return;
        }
        if state.live == 0 {
            self.terminate(&mut state, RunOutcome::Completed, None);
        } else {
            self.detect_deadlock(&mut state);
        }
    }

    /// Block the driver until the outcome is decided, then join every task
    /// thread.
    pub(crate) fn wait(&self) -> RunOutcome {
        let (outcome, threads) = {
            let mut state = self.state.lock();
            let outcome = loop {
                if let Some(outcome) = &state.outcome {
                    break outcome.clone();
                }
                self.changed.wait(&mut state);
            };
            (outcome, std::mem::take(&mut state.threads))
        };

        for handle in threads {
            if handle.join().is_err() {
                warn!("task thread exited abnormally");
            }
        }
        outcome
    }

    fn detect_deadlock(
        &self,
        state: &mut RunState,
    ) {
        if state.outcome.is_some() || state.setup_hold {
            return;
        }
        if state.live == 0 || state.blocked.len() != state.live {
            return;
        }

        let blocked = state
            .blocked
            .values()
            .map(|entry| BlockedTask {
                task: TaskRef::from(entry.task.as_ref()),
                channel: entry.channel,
                op: entry.op,
            })
            .collect();
        let report = DeadlockReport::new(blocked);
        error!(blocked = state.blocked.len(), "{}", report);
        self.terminate(state, RunOutcome::Deadlock(report), None);
    }

    /// Decide the outcome and wake every parked or sleeping task.
    fn terminate(
        &self,
        state: &mut RunState,
        outcome: RunOutcome,
        culprit: Option<TaskId>,
    ) {
        match &outcome {
            RunOutcome::Completed => info!("run completed"),
            RunOutcome::Deadlock(_) => {}
            RunOutcome::Fatal(err) => error!("panic: {}", err),
        }

        let halt = outcome.halt();
        for (id, entry) in std::mem::take(&mut state.blocked) {
            entry.task.set_status(TaskStatus::Runnable);
            let halt = match (&outcome, culprit) {
                (RunOutcome::Fatal(err), Some(culprit)) if culprit == id => Halt::Fatal(err.clone()),
                _ => halt.clone(),
            };
            entry.waiter.interrupt(halt);
        }

        state.outcome = Some(outcome);
        self.changed.notify_all();
    }
}

/// Thread entry point of every task.
fn run_task<F>(
    cx: TaskContext,
    jitter: Duration,
    body: F,
) where
    F: FnOnce(&TaskContext) -> TaskResult,
{
    let shared = cx.shared().clone();
    let task = cx.task().clone();

    let delay = random_delay(jitter);
    if !delay.is_zero() && shared.sleep(delay).is_err() {
        shared.finish(&task);
        return;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| body(&cx))) {
        Ok(Ok(())) => {}
        Ok(Err(halt)) => debug!(task = %task.id(), %halt, "task halted"),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            shared.fail(
                Some(task.id()),
                FatalError::TaskPanicked {
                    task: TaskRef::from(task.as_ref()),
                    message,
                },
            );
        }
    }

    drop(cx);
    shared.finish(&task);
}

fn random_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_us = max.as_micros().min(u64::MAX as u128) as u64;
    Duration::from_micros(rand::rng().random_range(0..=max_us))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        TaskRef {
            id: task.id(),
            name: task.name().to_string(),
        }
    }
}
