//! chanlab: goroutine-style tasks over rendezvous channels
//!
//! Tasks run on their own threads and talk only through typed [`Channel`]s.
//! The [`Scheduler`] tracks which tasks are parked on which channel and ends
//! the run the moment nothing is left that could wake anyone, reporting a
//! deadlock the way the Go runtime does.
//!
//! # Example
//!
//! ```no_run
//! use chanlab::{Channel, RunOutcome, Scheduler};
//!
//! let outcome = Scheduler::new().run_main(|cx| {
//!     let messages = Channel::<String>::unbuffered();
//!     // Nobody ever sends.
//!     messages.recv(cx)?;
//!     Ok(())
//! });
//! assert!(matches!(outcome, RunOutcome::Deadlock(_)));
//! ```

#![doc(html_root_url = "https://docs.rs/chanlab")]
#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod scenarios;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::{
    BlockedTask, Channel, ChannelId, ChannelOp, DeadlockReport, ExitPolicy, FatalError, Halt,
    RunOutcome, Scheduler, SchedulerConfig, StatsSnapshot, TaskBuilder, TaskContext, TaskHandle,
    TaskId, TaskRef, TaskResult, TaskStatus,
};
pub use scenarios::{Expectation, Scenario, ScenarioReport};

use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program name
pub const NAME: &str = "chanlab";

/// Run a catalog scenario by name.
///
/// # Example
///
/// ```no_run
/// use chanlab::{run_scenario, SchedulerConfig};
///
/// fn main() -> chanlab::Result<()> {
///     let report = run_scenario("fan-in-sum", &SchedulerConfig::default())?;
///     assert!(report.matches_expectation());
///     Ok(())
/// }
/// ```
pub fn run_scenario(
    name: &str,
    config: &SchedulerConfig,
) -> Result<ScenarioReport> {
    debug!(scenario = name, "looking up scenario");
    let scenario = scenarios::find(name)?;
    Ok(scenario.run(config))
}
