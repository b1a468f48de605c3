use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Root span for one ingestion cycle.
///
/// `observed_at` is recorded once the fetch stage has produced a sample.
pub fn cycle_span(trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "cycle",
        trace_id = %trace_id.as_str(),
        observed_at = field::Empty
    )
}

/// Child span for a single pipeline stage (inherits the trace id).
pub fn stage_span(stage: &'static str) -> Span {
    tracing::info_span!("stage", stage = %stage)
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        let a = TraceId::default();
        let b = TraceId::default();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[tokio::test]
    async fn warn_if_slow_passes_through_output() {
        let out = warn_if_slow("noop", Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, 7);
    }
}
