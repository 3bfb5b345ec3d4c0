//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their argument structs.
//! Every `run` flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "beacon-gateway",
    version,
    about = "Analytics event ingestion gateway",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        beacon-gateway run                           Start with ./config/routes.json\n  \
        beacon-gateway run -c routes.json -p 8080    Specific config and port\n  \
        beacon-gateway validate config/routes.json   Check routes and templates"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Run(Box<RunArgs>),

    /// Validate a route config and its templates without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        beacon-gateway run                                     Defaults\n  \
        beacon-gateway run -c routes.yaml --templates-dir tpl  Custom paths\n  \
        beacon-gateway run --debug --pretty                    Local dev mode")]
pub struct RunArgs {
    /// Route config file (.json, .yaml, .toml)
    #[arg(short, long, env = "ROUTES_CONFIG", default_value = "config/routes.json")]
    pub config: PathBuf,

    /// Directory route templates are resolved against
    #[arg(long, env = "TEMPLATES_DIR", default_value = "templates")]
    pub templates_dir: PathBuf,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Diagnostics --
    /// Detailed error bodies and debug-level logs
    #[arg(long, env = "DEBUG", help_heading = "Diagnostics")]
    pub debug: bool,

    /// Outcome records kept for GET /debug (clamped to 1000, 0 disables)
    #[arg(
        long,
        env = "DEBUG_LOG_ENTRIES",
        default_value_t = crate::debug::DEFAULT_DEBUG_ENTRIES,
        help_heading = "Diagnostics"
    )]
    pub debug_entries: usize,

    /// Re-read templates from disk on every request
    #[arg(long, env = "TEST_MODE", help_heading = "Diagnostics")]
    pub test_mode: bool,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Outbound timeout per target request, in milliseconds
    #[arg(
        long,
        env = "FORWARD_TIMEOUT_MS",
        default_value_t = 30_000,
        help_heading = "Tuning"
    )]
    pub timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Route config file to validate
    #[arg(default_value = "config/routes.json")]
    pub config: PathBuf,

    /// Directory route templates are resolved against
    #[arg(long, env = "TEMPLATES_DIR", default_value = "templates")]
    pub templates_dir: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
