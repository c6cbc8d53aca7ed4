//! Logger module for chanlab
//!
//! Go-style simple logging on stderr: `[LEVEL] message`. Stdout is left to
//! whatever the scenarios print.
//!
//! # Usage
//!
//! ```rust
//! use chanlab::util::logger;
//!
//! logger::init();
//! tracing::info!("Hello, {}", "world");
//! ```

use std::str::FromStr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

static INIT: OnceCell<()> = OnceCell::new();

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level `{}`", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Initialize logger with default configuration (INFO level)
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logger with custom level. Only the first call has an effect.
pub fn init_with_level(level: LogLevel) {
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

        // Go 风格：显示 [LEVEL] 前缀，不显示时间、不显示模块路径、无颜色
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_level(true)
            .with_ansi(false)
            .compact()
            .with_filter(filter);

        // Another subscriber may already be installed (tests, embedding).
        let _ = Registry::default().with(layer).try_init();
    });
}

/// Initialize logger for unit tests (DEBUG level, captured by the test
/// harness).
pub fn init_test() {
    INIT.get_or_init(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .without_time()
            .with_target(false)
            .compact()
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);
        let _ = Registry::default().with(layer).try_init();
    });
}
