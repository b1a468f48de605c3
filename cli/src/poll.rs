use std::time::Duration;

use anyhow::Result;
use corelib::Classify;
use pipeline::{CycleError, CycleReport, Pipeline};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Triggers a cycle every `every` until Ctrl-C.
///
/// No retries of its own: a failed cycle is logged and the next tick tries
/// again. A signal that arrives mid-cycle cancels the remaining stages.
pub async fn run(pipeline: &Pipeline, every: Duration) -> Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(every_secs = every.as_secs(), "poller started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = &mut shutdown => {
                warn!("shutdown signal received mid-cycle; remaining stages skipped");
                break;
            }
            outcome = pipeline.run_cycle() => log_outcome(&outcome),
        }
    }

    Ok(())
}

pub fn log_outcome(outcome: &Result<CycleReport, CycleError>) {
    match outcome {
        Ok(report) => info!(
            trace_id = %report.trace_id,
            observed_at = %report.observation.timestamp,
            value = %report.observation.value,
            events = report.events.len(),
            degraded = report.degradations().len(),
            "cycle succeeded"
        ),
        Err(e) => error!(
            error = %e,
            error_kind = %e.kind(),
            stage = %e.stage(),
            transient = e.kind().is_transient(),
            "cycle failed"
        ),
    }
}
