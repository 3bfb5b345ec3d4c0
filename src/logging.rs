//! Structured logging setup using the `tracing` ecosystem.
//!
//! JSON output when stdout is not a terminal, pretty output otherwise;
//! `--json` / `--pretty` force one. Chatty transport crates are capped
//! at `warn` whatever the chosen level.

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "rustls"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

/// Debug mode raises the level to at least `debug`.
#[must_use]
pub fn effective_level(level: &LogLevel, debug: bool) -> Level {
    let level = level.to_tracing_level();
    if debug && level < Level::DEBUG {
        Level::DEBUG
    } else {
        level
    }
}

#[must_use]
pub fn filter(level: Level) -> Targets {
    QUIET_TARGETS.iter().fold(
        Targets::new().with_default(level),
        |targets, &target| targets.with_target(target, level.min(Level::WARN)),
    )
}

pub fn init(level: Level, format: LogFormat) {
    let filter = filter(level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
