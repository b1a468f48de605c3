use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::logger::{TraceId, cycle_span, stage_span, warn_if_slow};
use corelib::{AnomalyEvent, Classify, ErrorKind, FeatureRecord, Observation};
use delivery::{AlertDispatcher, ArchiveSync, Artifact, DispatchResult, SyncResult};
use engine::{AnomalyDetector, RollingStatsEngine};
use feed::ObservationFetcher;
use history::{AppendReceipt, HistoryError, HistoryStore, SnapshotHandle};
use tokio::task;
use tracing::{Instrument, Span, field, info, warn};

use crate::error::{CycleError, Stage};

/// Fetches slower than this are flagged under the `performance` target.
const SLOW_FETCH: Duration = Duration::from_secs(2);

/// Everything a [`Pipeline`] is wired from.
pub struct Components {
    pub fetcher: Arc<dyn ObservationFetcher>,
    pub history: HistoryStore,
    pub stats: RollingStatsEngine,
    pub detector: AnomalyDetector,
    pub alerts: AlertDispatcher,
    pub archive: ArchiveSync,
    pub archive_dir: PathBuf,
    pub stage_timeout: Duration,
}

pub struct Pipeline {
    fetcher: Arc<dyn ObservationFetcher>,
    history: Arc<HistoryStore>,
    stats: Arc<RollingStatsEngine>,
    detector: AnomalyDetector,
    alerts: AlertDispatcher,
    archive: ArchiveSync,
    archive_dir: PathBuf,
    stage_timeout: Duration,
}

/// What one successful cycle did, including every non-fatal failure.
#[derive(Debug)]
pub struct CycleReport {
    pub trace_id: TraceId,
    pub observation: Observation,
    pub receipt: AppendReceipt,
    pub snapshot: Result<SnapshotHandle, CycleError>,
    pub raw_sync: SyncResult,
    pub snapshot_sync: SyncResult,
    pub features: FeatureRecord,
    pub events: Vec<AnomalyEvent>,
    pub alerts: DispatchResult,
    pub feature_sync: SyncResult,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Every failure the cycle absorbed, by stage, in stage order.
    pub fn degradations(&self) -> Vec<(Stage, ErrorKind)> {
        let mut out = Vec::new();

        if let Err(e) = &self.snapshot {
            out.push((Stage::Snapshot, e.kind()));
        }
        for (stage, sync) in [
            (Stage::ArchiveRaw, &self.raw_sync),
            (Stage::ArchiveSnapshot, &self.snapshot_sync),
        ] {
            if let Some(kind) = sync.error_kind() {
                out.push((stage, kind));
            }
        }
        out.extend(self.alerts.failures().map(|e| (Stage::Alert, e.kind())));
        if let Some(kind) = self.feature_sync.error_kind() {
            out.push((Stage::ArchiveFeatures, kind));
        }

        out
    }

    pub fn is_clean(&self) -> bool {
        self.degradations().is_empty()
    }
}

impl Pipeline {
    pub fn new(c: Components) -> Self {
        Self {
            fetcher: c.fetcher,
            history: Arc::new(c.history),
            stats: Arc::new(c.stats),
            detector: c.detector,
            alerts: c.alerts,
            archive: c.archive,
            archive_dir: c.archive_dir,
            stage_timeout: c.stage_timeout,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn stats(&self) -> &RollingStatsEngine {
        &self.stats
    }

    /// Runs one cycle under a fresh trace id.
    ///
    /// Dropping the returned future cancels the cycle: stages already
    /// committed stay committed, later stages do not run.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let trace_id = TraceId::default();
        let span = cycle_span(&trace_id);
        self.run_stages(trace_id).instrument(span).await
    }

    async fn run_stages(&self, trace_id: TraceId) -> Result<CycleReport, CycleError> {
        let started = Instant::now();

        let observation = self
            .fetch()
            .instrument(stage_span(Stage::Fetch.as_str()))
            .await?;
        Span::current().record("observed_at", field::display(observation.timestamp));

        let receipt = {
            let history = Arc::clone(&self.history);
            let obs = observation.clone();
            on_blocking_pool(Stage::Append, move || history.append(&obs))
                .instrument(stage_span(Stage::Append.as_str()))
                .await?
        };

        // The raw log is already durable; a failed snapshot only degrades the cycle.
        let snapshot = {
            let history = Arc::clone(&self.history);
            let dir = self.archive_dir.clone();
            on_blocking_pool(Stage::Snapshot, move || history.snapshot(&dir))
                .instrument(stage_span(Stage::Snapshot.as_str()))
                .await
                .inspect_err(|e| {
                    warn!(error = %e, error_kind = %e.kind(), "snapshot failed; raw log unaffected")
                })
        };

        let raw_sync = self
            .archive
            .push(&Artifact::raw_log(self.history.path()))
            .instrument(stage_span(Stage::ArchiveRaw.as_str()))
            .await;

        let snapshot_sync = match &snapshot {
            Ok(handle) => {
                self.archive
                    .push(&Artifact::snapshot(&handle.path))
                    .instrument(stage_span(Stage::ArchiveSnapshot.as_str()))
                    .await
            }
            Err(_) => SyncResult::Skipped,
        };

        let features = {
            let stats = Arc::clone(&self.stats);
            let history = Arc::clone(&self.history);
            let obs = observation.clone();
            on_blocking_pool(Stage::Features, move || stats.compute_features(&obs, &history))
                .instrument(stage_span(Stage::Features.as_str()))
                .await?
        };

        let events = stage_span(Stage::Detect.as_str())
            .in_scope(|| self.detector.evaluate(&observation, &features));

        let alerts = self
            .alerts
            .dispatch(&events)
            .instrument(stage_span(Stage::Alert.as_str()))
            .await;

        let feature_sync = self
            .archive
            .push(&Artifact::feature_log(self.stats.feature_log().path()))
            .instrument(stage_span(Stage::ArchiveFeatures.as_str()))
            .await;

        let report = CycleReport {
            trace_id,
            observation,
            receipt,
            snapshot,
            raw_sync,
            snapshot_sync,
            features,
            events,
            alerts,
            feature_sync,
            elapsed: started.elapsed(),
        };

        let degradations = report.degradations();
        info!(
            value = %report.observation.value,
            record = report.receipt.index,
            events = report.events.len(),
            degraded = degradations.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "cycle complete"
        );
        for (stage, kind) in &degradations {
            warn!(%stage, %kind, "cycle degraded");
        }

        Ok(report)
    }

    async fn fetch(&self) -> Result<Observation, CycleError> {
        let timeout = self.stage_timeout;
        let fetched = warn_if_slow("fetch", SLOW_FETCH, async {
            tokio::time::timeout(timeout, self.fetcher.fetch()).await
        })
        .await;

        match fetched {
            Ok(Ok(obs)) => Ok(obs),
            Ok(Err(e)) => {
                warn!(error = %e, error_kind = %e.kind(), "fetch failed; cycle aborted");
                Err(CycleError::Fetch(e))
            }
            Err(_) => {
                warn!(?timeout, "fetch timed out; cycle aborted");
                Err(CycleError::FetchTimeout(timeout))
            }
        }
    }
}

/// Runs fsync-bound file work on the blocking pool, inside the current span.
///
/// Once started the work runs to completion even if the cycle is dropped;
/// each history write is all-or-nothing either way.
async fn on_blocking_pool<T, F>(stage: Stage, work: F) -> Result<T, CycleError>
where
    F: FnOnce() -> Result<T, HistoryError> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|source| CycleError::Interrupted { stage, source })?
        .map_err(CycleError::persistence(stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_work_runs_off_the_async_worker() {
        let caller = std::thread::current().id();

        let worker = on_blocking_pool(Stage::Append, || Ok(std::thread::current().id()))
            .await
            .unwrap();

        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn history_errors_keep_their_stage() {
        let err = on_blocking_pool::<(), _>(Stage::Features, || {
            Err(HistoryError::SnapshotExists("x.csv".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CycleError::Persistence { stage: Stage::Features, .. }), "{err}");
    }

    #[tokio::test]
    async fn panicking_file_work_is_reported_as_interrupted() {
        let err = on_blocking_pool::<(), _>(Stage::Snapshot, || panic!("disk on fire"))
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Interrupted { stage: Stage::Snapshot, .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::PersistenceError);
    }
}
