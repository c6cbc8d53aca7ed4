//! Scenario catalog
//!
//! Each scenario is one of the classic goroutine/channel micro-programs,
//! written against the runtime's public surface, together with the outcome
//! it is expected to produce. The body of a scenario is its `main` task;
//! anything it "prints" goes to a [`Transcript`].

mod blocking;
mod fan_in;
mod signal;

use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::runtime::{
    ExitPolicy, FatalError, RunOutcome, Scheduler, SchedulerConfig, StatsSnapshot, TaskContext,
    TaskResult,
};

/// Lines a scenario printed, in the order they were printed.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn print(
        &self,
        line: impl Into<String>,
    ) {
        let line = line.into();
        info!(target: "chanlab::transcript", "{}", line);
        self.lines.lock().push(line);
    }

    /// Copy of every line printed so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// The outcome a scenario is expected to end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Completed,
    Deadlock,
    ClosedChannelSend,
    DoubleClose,
}

impl Expectation {
    /// Check an outcome against this expectation.
    pub fn matches(
        &self,
        outcome: &RunOutcome,
    ) -> bool {
        match (self, outcome) {
            (Expectation::Completed, RunOutcome::Completed) => true,
            (Expectation::Deadlock, RunOutcome::Deadlock(_)) => true,
            (
                Expectation::ClosedChannelSend,
                RunOutcome::Fatal(FatalError::ClosedChannelSend { .. }),
            ) => true,
            (Expectation::DoubleClose, RunOutcome::Fatal(FatalError::DoubleClose { .. })) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Expectation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            Expectation::Completed => "completed",
            Expectation::Deadlock => "deadlock",
            Expectation::ClosedChannelSend => "fatal: send on closed channel",
            Expectation::DoubleClose => "fatal: close of closed channel",
        };
        f.write_str(s)
    }
}

/// Body of a scenario's `main` task.
pub type ScenarioBody = fn(&TaskContext, &Transcript) -> TaskResult;

/// A named, runnable program with a known outcome.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    pub expected: Expectation,
    /// Exit policy the program needs, overriding the configured one.
    pub policy: Option<ExitPolicy>,
    body: ScenarioBody,
}

impl Scenario {
    /// Run the scenario on a fresh scheduler.
    pub fn run(
        &self,
        config: &SchedulerConfig,
    ) -> ScenarioReport {
        let mut config = config.clone();
        if let Some(policy) = self.policy {
            config.exit_policy = policy;
        }

        info!(scenario = self.name, "running scenario");
        let scheduler = Scheduler::with_config(config);
        let transcript = Transcript::new();
        let printer = transcript.clone();
        let body = self.body;
        let outcome = scheduler.run_main(move |cx| body(cx, &printer));

        ScenarioReport {
            name: self.name,
            expected: self.expected,
            matched: self.expected.matches(&outcome),
            outcome,
            transcript: transcript.lines(),
            stats: scheduler.stats().snapshot(),
        }
    }
}

/// What a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub expected: Expectation,
    pub matched: bool,
    pub outcome: RunOutcome,
    pub transcript: Vec<String>,
    pub stats: StatsSnapshot,
}

impl ScenarioReport {
    #[inline]
    pub fn matches_expectation(&self) -> bool {
        self.matched
    }
}

/// No scenario has the requested name.
#[derive(Debug, Clone, Error)]
#[error("unknown scenario `{0}` (see `chanlab list`)")]
pub struct UnknownScenario(pub String);

const fn scenario(
    name: &'static str,
    summary: &'static str,
    expected: Expectation,
    policy: Option<ExitPolicy>,
    body: ScenarioBody,
) -> Scenario {
    Scenario {
        name,
        summary,
        expected,
        policy,
        body,
    }
}

static CATALOG: &[Scenario] = &[
    scenario(
        "fan-in-sum",
        "two tasks sum halves of a slice, main receives both partial sums",
        Expectation::Completed,
        None,
        fan_in::fan_in_sum,
    ),
    scenario(
        "fan-in-extra-receive",
        "main receives three times from two senders",
        Expectation::Deadlock,
        None,
        fan_in::fan_in_extra_receive,
    ),
    scenario(
        "fan-in-report-twice",
        "a helper that receives twice is called twice for two senders",
        Expectation::Deadlock,
        None,
        fan_in::fan_in_report_twice,
    ),
    scenario(
        "inline-closures",
        "two closures each send a square on an unbuffered channel",
        Expectation::Completed,
        None,
        fan_in::inline_closures,
    ),
    scenario(
        "main-exit",
        "senders park on a done channel nobody writes, main exits after its receives",
        Expectation::Completed,
        Some(ExitPolicy::MainExit),
        fan_in::main_exit,
    ),
    scenario(
        "out-of-order",
        "main sends on the string channel while the receiver waits on the int channel",
        Expectation::Deadlock,
        None,
        blocking::out_of_order,
    ),
    scenario(
        "no-live-goroutines",
        "main and one task both receive from a channel nobody sends on",
        Expectation::Deadlock,
        None,
        blocking::no_live_goroutines,
    ),
    scenario(
        "sleeping-sender",
        "a task sleeps before sending, main blocks receiving until it does",
        Expectation::Completed,
        None,
        blocking::sleeping_sender,
    ),
    scenario(
        "sleeping-receiver",
        "a task waits to receive while main sleeps before sending",
        Expectation::Completed,
        None,
        blocking::sleeping_receiver,
    ),
    scenario(
        "buffered-handoff",
        "a capacity-1 channel takes the first send before any receiver exists",
        Expectation::Completed,
        None,
        blocking::buffered_handoff,
    ),
    scenario(
        "never-closed-signal",
        "main waits on a quiesce signal channel that is never closed",
        Expectation::Deadlock,
        None,
        signal::never_closed_signal,
    ),
    scenario(
        "closed-signal-broadcast",
        "closing a quiesce signal channel releases every waiting worker",
        Expectation::Completed,
        None,
        signal::closed_signal_broadcast,
    ),
    scenario(
        "send-after-close",
        "main closes a channel and then sends on it",
        Expectation::ClosedChannelSend,
        None,
        signal::send_after_close,
    ),
    scenario(
        "double-close",
        "a channel is closed twice",
        Expectation::DoubleClose,
        None,
        signal::double_close,
    ),
];

/// Every scenario, in catalog order.
pub fn catalog() -> &'static [Scenario] {
    CATALOG
}

/// Look a scenario up by name.
pub fn find(name: &str) -> Result<&'static Scenario, UnknownScenario> {
    CATALOG
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| UnknownScenario(name.to_string()))
}

/// Scenarios whose name matches `pattern`.
pub fn filter(pattern: &Regex) -> Vec<&'static Scenario> {
    CATALOG.iter().filter(|s| pattern.is_match(s.name)).collect()
}
