mod cli;
mod poll;

use anyhow::{Context, Result};
use clap::Parser;
use common::logger::init_logger;
use pipeline::{Pipeline, PipelineConfig};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_logger("pricewatch", cli.json_logs || is_production);

    let cfg = PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let pipeline = Pipeline::from_config(&cfg)?;

    match cli.command {
        Command::RunOnce => {
            let outcome = pipeline.run_cycle().await;
            poll::log_outcome(&outcome);
            outcome.context("ingestion cycle failed")?;
            Ok(())
        }
        Command::Poll { every } => poll::run(&pipeline, every).await,
    }
}
