//! Task scheduler for goroutine-style concurrent execution
//!
//! Every spawned task runs on its own thread. The scheduler tracks how many
//! tasks are live and which of them are parked on a channel, and ends the
//! run as soon as it completes, deadlocks or hits a fatal error.

mod context;
mod outcome;
mod state;
pub mod task;

pub use context::TaskContext;
pub use outcome::{
    BlockedTask, DeadlockReport, FatalError, Halt, RunOutcome, TaskRef, TaskResult,
    EXIT_COMPLETED, EXIT_DEADLOCK, EXIT_FATAL,
};
pub use task::{TaskBuilder, TaskHandle, TaskId, TaskIdGenerator, TaskStatus};

pub(crate) use state::{Interrupt, RunShared};

use std::str::FromStr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tracing::info;

/// What ends a run when the `main` task returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// The run ends only when every task has finished.
    #[default]
    WaitAll,
    /// The run completes as soon as `main` returns; unfinished tasks are
    /// abandoned and reported.
    MainExit,
}

impl FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wait-all" => Ok(ExitPolicy::WaitAll),
            "main-exit" => Ok(ExitPolicy::MainExit),
            other => Err(format!(
                "unknown exit policy `{}` (expected `wait-all` or `main-exit`)",
                other
            )),
        }
    }
}

impl std::fmt::Display for ExitPolicy {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ExitPolicy::WaitAll => f.write_str("wait-all"),
            ExitPolicy::MainExit => f.write_str("main-exit"),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Stack size of each task thread.
    pub stack_size: usize,
    /// What happens when `main` returns.
    pub exit_policy: ExitPolicy,
    /// Upper bound of the random delay before a task starts, in
    /// milliseconds. Zero disables jitter.
    pub start_jitter_ms: u64,
    /// Prefix of task thread names.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: 256 * 1024,
            exit_policy: ExitPolicy::WaitAll,
            start_jitter_ms: 0,
            thread_name_prefix: "chanlab-task".to_string(),
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Total tasks spawned.
    pub tasks_spawned: AtomicUsize,
    /// Total task bodies that returned.
    pub tasks_finished: AtomicUsize,
    /// Tasks left unfinished when `main` exited.
    pub tasks_abandoned: AtomicUsize,
    /// Times a task parked on a channel.
    pub parks: AtomicUsize,
    /// Values handed directly from one task to another.
    pub handoffs: AtomicUsize,
    /// Values that went through a channel buffer.
    pub buffered_sends: AtomicUsize,
    /// Peak number of live tasks.
    pub peak_live: AtomicUsize,
}

impl SchedulerStats {
    #[inline]
    pub fn record_spawned(&self) {
        self.tasks_spawned.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_finished(&self) {
        self.tasks_finished.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_abandoned(
        &self,
        count: usize,
    ) {
        self.tasks_abandoned.fetch_add(count, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_park(&self) {
        self.parks.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_handoff(&self) {
        self.handoffs.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_buffered(&self) {
        self.buffered_sends.fetch_add(1, Ordering::SeqCst);
    }

    /// Update the live-task high-water mark.
    #[inline]
    pub fn update_peak_live(
        &self,
        current: usize,
    ) {
        loop {
            let peak = self.peak_live.load(Ordering::SeqCst);
            if current <= peak {
                break;
            }
            if self
                .peak_live
                .compare_exchange(peak, current, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Plain copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tasks_spawned: self.tasks_spawned.load(Ordering::SeqCst),
            tasks_finished: self.tasks_finished.load(Ordering::SeqCst),
            tasks_abandoned: self.tasks_abandoned.load(Ordering::SeqCst),
            parks: self.parks.load(Ordering::SeqCst),
            handoffs: self.handoffs.load(Ordering::SeqCst),
            buffered_sends: self.buffered_sends.load(Ordering::SeqCst),
            peak_live: self.peak_live.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub tasks_spawned: usize,
    pub tasks_finished: usize,
    pub tasks_abandoned: usize,
    pub parks: usize,
    pub handoffs: usize,
    pub buffered_sends: usize,
    pub peak_live: usize,
}

/// Deadlock-detecting scheduler for one run.
///
/// Tasks may be spawned before [`Scheduler::run`]; they start immediately,
/// but the run cannot be declared complete or deadlocked until `run` is
/// called, since the caller may still be about to spawn the counterpart of
/// a blocked operation.
///
/// ```no_run
/// use chanlab::{Channel, RunOutcome, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let outcome = scheduler.run_main(|cx| {
///     let ch = Channel::unbuffered();
///     let tx = ch.clone();
///     cx.spawn(move |cx| tx.send(cx, 42))?;
///     assert_eq!(ch.recv(cx)?, Some(42));
///     Ok(())
/// });
/// assert_eq!(outcome, RunOutcome::Completed);
/// ```
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<RunShared>,
}

impl Scheduler {
    /// Create a scheduler with default config.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(RunShared::new(config)),
        }
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Spawn a task. Fire-and-forget: the caller does not wait for it.
    pub fn spawn<F>(
        &self,
        body: F,
    ) -> Result<TaskHandle, Halt>
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.shared.spawn(TaskBuilder::new(), false, body)
    }

    /// Spawn a task with a name or stack size.
    pub fn spawn_with<F>(
        &self,
        builder: TaskBuilder,
        body: F,
    ) -> Result<TaskHandle, Halt>
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.shared.spawn(builder, false, body)
    }

    /// Drive every task until the run completes, deadlocks or hits a fatal
    /// error. Joins all task threads before returning. Calling it again
    /// returns the same outcome.
    pub fn run(&self) -> RunOutcome {
        info!(
            tasks = self.shared.live_tasks(),
            policy = %self.shared.config.exit_policy,
            "run started"
        );
        self.shared.release_setup();
        self.shared.wait()
    }

    /// Spawn `body` as the task named `main`, then [`Scheduler::run`].
    pub fn run_main<F>(
        &self,
        body: F,
    ) -> RunOutcome
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        // A failed spawn has already recorded the outcome.
        let _ = self.shared.spawn(TaskBuilder::new(), true, body);
        self.run()
    }

    /// The outcome, if the run has ended.
    #[inline]
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.shared.outcome()
    }

    /// Number of tasks spawned and not yet finished.
    #[inline]
    pub fn live_tasks(&self) -> usize {
        self.shared.live_tasks()
    }

    /// Number of tasks currently parked on a channel.
    #[inline]
    pub fn blocked_tasks(&self) -> usize {
        self.shared.blocked_tasks()
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.shared.stats
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Task threads never outlive their scheduler.
        self.shared.release_setup();
        self.shared.wait();
    }
}

#[cfg(test)]
mod tests;
