use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use corelib::duration::parse_duration;

#[derive(Debug, Parser)]
#[clap(name = "pricewatch", version)]
pub struct Cli {
    /// TOML config file; PRICEWATCH_* environment variables override it
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines (also enabled by APP_ENV=production)
    #[clap(long, global = true)]
    pub json_logs: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run exactly one ingestion cycle and exit (non-zero on a fatal failure)
    RunOnce,

    /// Run a cycle on a fixed cadence until interrupted; missed ticks are skipped
    Poll {
        /// Cadence, e.g. 30s, 5m, 1h
        #[clap(long, default_value = "5m", value_parser = parse_every)]
        every: Duration,
    },
}

fn parse_every(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}
