//! chanlab - CLI

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use regex::Regex;

use chanlab::scenarios::{self, Scenario};
use chanlab::util::config::{self, Config};
use chanlab::util::logger::{self, LogLevel};
use chanlab::{run_scenario, ExitPolicy, RunOutcome, NAME, VERSION};

/// Goroutine-style channel programs with Go's deadlock detection
#[derive(Parser, Debug)]
#[command(name = "chanlab")]
#[command(author = "chanlab contributors")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./chanlab.toml when present)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level: debug, info, warn or error
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// What ends a run when main returns: wait-all or main-exit
    #[arg(long, value_name = "POLICY", global = true)]
    exit_policy: Option<ExitPolicy>,

    /// Random start delay for each task, in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    jitter_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the scenario catalog
    List {
        /// Only scenarios whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        filter: Option<String>,
    },

    /// Run one scenario and exit with its outcome's code
    Run {
        /// Scenario name
        #[arg(value_name = "NAME")]
        name: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run scenarios and compare each outcome to its expectation
    Check {
        /// Only scenarios whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        filter: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print version information
    Version,
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let config = effective_config(&args)?;

    logger::init_with_level(config.log.level);
    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::List { filter } => {
            for scenario in select(filter.as_deref())? {
                println!(
                    "{:<24} {:<32} {}",
                    scenario.name,
                    scenario.expected.to_string(),
                    scenario.summary
                );
            }
            Ok(0)
        }
        Commands::Run { name, json } => {
            let report = run_scenario(&name, &config.scheduler)?;
            if json {
                let text = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                println!("{}", text);
            } else {
                for line in &report.transcript {
                    println!("{}", line);
                }
                if !report.outcome.is_completed() {
                    eprintln!("{}", report.outcome);
                }
            }
            Ok(report.outcome.exit_code())
        }
        Commands::Check { filter, no_color } => {
            let selected = select(filter.as_deref())?;
            let mut failed = 0;
            for scenario in &selected {
                let report = scenario.run(&config.scheduler);
                let ok = report.matches_expectation();
                if !ok {
                    failed += 1;
                }
                let mark = match (ok, no_color) {
                    (true, true) => "ok".to_string(),
                    (false, true) => "FAIL".to_string(),
                    (true, false) => "ok".green().to_string(),
                    (false, false) => "FAIL".red().bold().to_string(),
                };
                println!(
                    "{:<4} {:<24} expected {}, got {}",
                    mark,
                    scenario.name,
                    scenario.expected,
                    summarize(&report.outcome)
                );
            }
            println!("{} passed, {} failed", selected.len() - failed, failed);
            Ok(if failed == 0 { 0 } else { 1 })
        }
        Commands::Config => {
            print!("{}", config::to_toml_string(&config)?);
            Ok(0)
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
            Ok(0)
        }
    }
}

/// Defaults, then the config file, then `CHANLAB_*`, then flags.
fn effective_config(args: &Args) -> Result<Config> {
    let mut config = config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(policy) = args.exit_policy {
        config.scheduler.exit_policy = policy;
    }
    if let Some(jitter) = args.jitter_ms {
        config.scheduler.start_jitter_ms = jitter;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if args.verbose {
        config.log.level = LogLevel::Debug;
    }
    Ok(config)
}

fn select(filter: Option<&str>) -> Result<Vec<&'static Scenario>> {
    match filter {
        Some(pattern) => {
            let re = Regex::new(pattern)
                .with_context(|| format!("Invalid filter regex: {}", pattern))?;
            Ok(scenarios::filter(&re))
        }
        None => Ok(scenarios::catalog().iter().collect()),
    }
}

fn summarize(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Deadlock(report) => {
            format!("deadlock ({} blocked)", report.blocked().len())
        }
        RunOutcome::Fatal(err) => format!("fatal: {}", err),
    }
}
