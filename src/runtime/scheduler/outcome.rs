//! Run outcomes and the errors that end a run.

use serde::Serialize;
use thiserror::Error;

use super::task::TaskId;
use crate::runtime::channel::{ChannelId, ChannelOp};

/// Exit code for a run that completed.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code for a run that deadlocked.
pub const EXIT_DEADLOCK: i32 = 2;
/// Exit code for a run that hit a fatal error.
pub const EXIT_FATAL: i32 = 3;

/// A task as named in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub name: String,
}

impl std::fmt::Display for TaskRef {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{} \"{}\"", self.id, self.name)
    }
}

/// Fatal conditions. Each one terminates the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FatalError {
    /// Send on a channel that was already closed.
    #[error("send on closed channel {channel} by {task}")]
    ClosedChannelSend { task: TaskRef, channel: ChannelId },

    /// Close of a channel that was already closed.
    #[error("close of closed channel {channel} by {task}")]
    DoubleClose { task: TaskRef, channel: ChannelId },

    /// A task body panicked.
    #[error("{task} panicked: {message}")]
    TaskPanicked { task: TaskRef, message: String },

    /// The OS refused to start a task thread.
    #[error("failed to spawn task \"{name}\": {reason}")]
    SpawnFailed { name: String, reason: String },
}

impl FatalError {
    /// The task charged with the error, if one was running.
    pub fn task(&self) -> Option<TaskId> {
        match self {
            FatalError::ClosedChannelSend { task, .. }
            | FatalError::DoubleClose { task, .. }
            | FatalError::TaskPanicked { task, .. } => Some(task.id),
            FatalError::SpawnFailed { .. } => None,
        }
    }
}

/// One task that was parked when the deadlock was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub task: TaskRef,
    pub channel: ChannelId,
    pub op: ChannelOp,
}

impl std::fmt::Display for BlockedTask {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{} blocked on {} {}", self.task, self.op, self.channel)
    }
}

/// Every task that was asleep when the run deadlocked, in the order they
/// blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlockReport {
    blocked: Vec<BlockedTask>,
}

impl DeadlockReport {
    pub(crate) fn new(blocked: Vec<BlockedTask>) -> Self {
        Self { blocked }
    }

    /// All blocked tasks.
    #[inline]
    pub fn blocked(&self) -> &[BlockedTask] {
        &self.blocked
    }

    /// The task that has been blocked the longest.
    #[inline]
    pub fn first(&self) -> Option<&BlockedTask> {
        self.blocked.first()
    }

    /// Check whether a task is part of the deadlock.
    pub fn contains(
        &self,
        id: TaskId,
    ) -> bool {
        self.blocked.iter().any(|b| b.task.id == id)
    }

    /// Find a blocked task by name.
    pub fn find(
        &self,
        name: &str,
    ) -> Option<&BlockedTask> {
        self.blocked.iter().find(|b| b.task.name == name)
    }
}

impl std::fmt::Display for DeadlockReport {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "all tasks are asleep - deadlock!")?;
        for blocked in &self.blocked {
            write!(f, "\n  {}", blocked)?;
        }
        Ok(())
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every task finished (or `main` exited under the main-exit policy).
    Completed,
    /// Every live task was blocked with nothing left to unblock them.
    Deadlock(DeadlockReport),
    /// A task raised a fatal condition.
    Fatal(FatalError),
}

impl RunOutcome {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    #[inline]
    pub fn is_deadlock(&self) -> bool {
        matches!(self, RunOutcome::Deadlock(_))
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunOutcome::Fatal(_))
    }

    /// Process exit code for a CLI driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => EXIT_COMPLETED,
            RunOutcome::Deadlock(_) => EXIT_DEADLOCK,
            RunOutcome::Fatal(_) => EXIT_FATAL,
        }
    }

    /// The halt delivered to tasks that were still alive when this outcome
    /// was decided.
    pub(crate) fn halt(&self) -> Halt {
        match self {
            RunOutcome::Completed => Halt::Abandoned,
            RunOutcome::Deadlock(_) => Halt::Deadlock,
            RunOutcome::Fatal(_) => Halt::Aborted,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Deadlock(report) => write!(f, "fatal error: {}", report),
            RunOutcome::Fatal(err) => write!(f, "panic: {}", err),
        }
    }
}

/// Why a task must stop. Returned by every blocking operation once the run
/// has an outcome; task bodies propagate it with `?`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Halt {
    /// This task caused the fatal error.
    #[error(transparent)]
    Fatal(FatalError),

    /// The run deadlocked.
    #[error("all tasks are asleep - deadlock")]
    Deadlock,

    /// Another task caused a fatal error.
    #[error("run aborted by a fatal error in another task")]
    Aborted,

    /// The main task exited first.
    #[error("main task exited before this task finished")]
    Abandoned,
}

/// Return type of task bodies.
pub type TaskResult = Result<(), Halt>;
