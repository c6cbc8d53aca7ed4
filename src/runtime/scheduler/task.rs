//! Task definitions for the scheduler.
//!
//! A task is the goroutine-equivalent unit of work. The scheduler owns the
//! shared [`Task`] record; callers observe it through a [`TaskHandle`].

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use serde::Serialize;

/// Unique task identifier, allocated per scheduler in spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl From<usize> for TaskId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl From<TaskId> for usize {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is running or ready to run.
    Runnable,
    /// Task is parked on a channel send or receive.
    Blocked,
    /// Task body has returned.
    Finished,
}

impl TaskStatus {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => TaskStatus::Blocked,
            2 => TaskStatus::Finished,
            _ => TaskStatus::Runnable,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            TaskStatus::Runnable => 0,
            TaskStatus::Blocked => 1,
            TaskStatus::Finished => 2,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Runnable => "runnable",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Scheduler-owned record of a spawned task.
pub struct Task {
    /// Unique task ID.
    id: TaskId,
    /// Task name for diagnostics.
    name: String,
    /// Current status (atomic so handles can poll it without the run lock).
    status: AtomicU8,
}

impl std::fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl Task {
    /// Create a new runnable task record.
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status: AtomicU8::new(TaskStatus::Runnable.as_u8()),
        }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current status.
    #[inline]
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Set the task status.
    #[inline]
    pub fn set_status(
        &self,
        status: TaskStatus,
    ) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    /// Check if the task is finished.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status() == TaskStatus::Finished
    }
}

/// Fire-and-forget handle returned by spawn.
///
/// Dropping the handle does not affect the task. The handle only observes.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Get the current status.
    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Check if the task body has returned.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Task builder for spawning tasks with a name or a custom stack size.
#[derive(Debug, Default, Clone)]
pub struct TaskBuilder {
    pub(crate) name: Option<String>,
    pub(crate) stack_size: Option<usize>,
}

impl TaskBuilder {
    /// Create a new task builder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task name.
    #[inline]
    pub fn name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stack size of the task's thread.
    #[inline]
    pub fn stack_size(
        mut self,
        size: usize,
    ) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// Generator for task IDs.
#[derive(Debug)]
pub struct TaskIdGenerator {
    next_id: usize,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        TaskId(id)
    }
}

impl Default for TaskIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
