//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "pendulum", version, about = "Pendulum sorting line controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/pendulum.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the controller and sort packages read as JSON lines from stdin
    Run {
        /// Write package history here instead of [history] file / stdout
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,
    },
    /// Drive the full engine against a simulated controller
    Simulate {
        /// Number of packages to generate
        #[arg(long, default_value_t = 20)]
        packages: u64,
        /// Spacing between consecutive trigger signals
        #[arg(long = "interval-ms", value_name = "MS", default_value_t = 300)]
        interval_ms: u64,
        /// Seed for chute and weight generation
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Validate the config and make one bounded connect to the controller
    SelfCheck,
}
