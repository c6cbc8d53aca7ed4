//! The handle a task body uses to talk to its scheduler.

use std::sync::Arc;
use std::time::Duration;

use super::outcome::{Halt, TaskRef, TaskResult};
use super::state::RunShared;
use super::task::{Task, TaskBuilder, TaskHandle, TaskId};

/// Passed by reference to every task body. Identifies the running task to
/// channel operations and lets the body spawn more tasks or sleep.
///
/// Not `Clone`: a context belongs to exactly one task thread.
pub struct TaskContext {
    task: Arc<Task>,
    shared: Arc<RunShared>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .finish()
    }
}

impl TaskContext {
    pub(crate) fn new(
        task: Arc<Task>,
        shared: Arc<RunShared>,
    ) -> Self {
        Self { task, shared }
    }

    /// ID of the running task.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Name of the running task.
    #[inline]
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Spawn a sibling task. Returns as soon as the task is started.
    pub fn spawn<F>(
        &self,
        body: F,
    ) -> Result<TaskHandle, Halt>
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.shared.spawn(TaskBuilder::new(), false, body)
    }

    /// Spawn a sibling task with a name or stack size.
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

    /// Timed delay. The task stays runnable while sleeping, so a sleeping
    /// task never counts towards a deadlock.
    pub fn sleep(
        &self,
        duration: Duration,
    ) -> Result<(), Halt> {
        self.shared.sleep(duration)
    }

    /// Give other threads a chance to run.
    pub fn yield_now(&self) -> Result<(), Halt> {
        std::thread::yield_now();
        self.shared.ensure_running()
    }

    pub(crate) fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub(crate) fn task_ref(&self) -> TaskRef {
        TaskRef::from(self.task.as_ref())
    }

    pub(crate) fn shared(&self) -> &Arc<RunShared> {
        &self.shared
    }
}
