//! CLI argument definitions for logsentry.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Cron-driven log monitor.
///
/// Each invocation performs exactly one unit of work: a monitoring pass
/// (default), the daily digest (`--digest`), or a test alert (`--test`).
#[derive(Parser, Debug)]
#[command(name = "logsentry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to logsentry.toml configuration file.
    #[arg(short, long, default_value = "/etc/logsentry/logsentry.toml")]
    pub config: PathBuf,

    /// Send the daily digest for today and prune old counters.
    #[arg(long, conflicts_with = "test")]
    pub digest: bool,

    /// Send a test alert and exit. Touches no state.
    #[arg(long)]
    pub test: bool,

    /// Render and log notifications instead of sending them.
    ///
    /// Checkpoints and counters still advance.
    #[arg(long)]
    pub dry_run: bool,

    /// Validate configuration and rules, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,
}

/// The unit of work selected for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Scan all sources once, then run health checks.
    Pass,
    /// Send the daily digest.
    Digest,
    /// Send the test alert.
    Test,
}

impl Cli {
    /// The selected mode.
    pub fn mode(&self) -> Mode {
        if self.test {
            Mode::Test
        } else if self.digest {
            Mode::Digest
        } else {
            Mode::Pass
        }
    }
}
