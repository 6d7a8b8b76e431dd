//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::fetch::FailMode;
use crate::subscription::Gate;

/// feedsub - single-flight fetch loop with deduplication and backpressure
#[derive(Parser, Debug)]
#[command(name = "feedsub", author, version, about = "Poll a slow source and stream new items", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to the simulated source and print items as they arrive
    ///
    /// Ctrl+C closes the subscription and prints the last fetch error;
    /// SIGTERM cancels it without waiting for a reply.
    Run(RunArgs),

    /// Print the effective configuration as YAML
    Config,
}

/// Overrides for `feedsub run`
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Pending length above which no new fetch starts
    #[arg(short, long)]
    pub max_pending: Option<usize>,

    /// Fetch gating rule
    #[arg(short, long, value_enum)]
    pub gate: Option<Gate>,

    /// How often the simulated source fails
    #[arg(short, long, value_enum)]
    pub fail_mode: Option<FailMode>,

    /// Items per successful fetch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Latency of each fetch in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Close the subscription after this many seconds
    #[arg(short, long)]
    pub duration_secs: Option<u64>,
}

impl RunArgs {
    /// Apply the overrides given on the command line
    pub fn apply(&self, config: &mut Config) {
        if let Some(max_pending) = self.max_pending {
            config.subscription.max_pending = max_pending;
        }
        if let Some(gate) = self.gate {
            config.subscription.gate = gate;
        }
        if let Some(fail_mode) = self.fail_mode {
            config.fetcher.fail_mode = fail_mode;
        }
        if let Some(batch_size) = self.batch_size {
            config.fetcher.batch_size = batch_size;
        }
        if let Some(latency_ms) = self.latency_ms {
            config.fetcher.latency_ms = latency_ms;
        }
    }
}
