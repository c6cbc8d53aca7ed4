//! Runtime system
//!
//! Channels and the deadlock-detecting task scheduler.

pub mod channel;
pub mod scheduler;

pub use channel::{Channel, ChannelId, ChannelOp};
pub use scheduler::{
    BlockedTask, DeadlockReport, ExitPolicy, FatalError, Halt, RunOutcome, Scheduler,
    SchedulerConfig, SchedulerStats, StatsSnapshot, TaskBuilder, TaskContext, TaskHandle, TaskId,
    TaskRef, TaskResult, TaskStatus,
};
