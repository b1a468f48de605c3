use std::sync::Arc;

use anyhow::{Context, Result};
use delivery::{AlertDispatcher, ArchiveSync, archive_sink_from_uri, notifier_from_uri};
use engine::{AnomalyDetector, RollingStatsEngine};
use feed::{HttpPriceSource, ResponseShape, SourceConfig};
use history::{FeatureLog, HistoryStore};
use tracing::info;

use crate::config::PipelineConfig;
use crate::cycle::{Components, Pipeline};

impl Pipeline {
    /// Opens the local logs and builds the HTTP-backed collaborators.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let fetcher = HttpPriceSource::new(SourceConfig {
            endpoint: cfg.source_endpoint.clone(),
            shape: ResponseShape {
                value_pointer: cfg.value_pointer.clone(),
                timestamp_pointer: cfg.timestamp_pointer.clone(),
            },
            request_timeout: cfg.request_timeout,
        })
        .context("failed to build price source client")?;

        let history = HistoryStore::open(&cfg.history_path, cfg.ordering_policy)
            .context("failed to open history log")?;

        let features = FeatureLog::open(&cfg.feature_path, &cfg.lookback_windows, cfg.ordering_policy)
            .context("failed to open feature log")?;

        let notifier = cfg
            .notification_sink_uri
            .as_deref()
            .map(|uri| notifier_from_uri(uri, cfg.request_timeout))
            .transpose()
            .context("invalid notification_sink_uri")?;

        let sink = cfg
            .archive_sink_uri
            .as_deref()
            .map(|uri| archive_sink_from_uri(uri, cfg.request_timeout))
            .transpose()
            .context("invalid archive_sink_uri")?;

        let alerts = AlertDispatcher::new(notifier, cfg.asset.clone(), cfg.stage_timeout);
        let archive = ArchiveSync::new(sink, cfg.stage_timeout);

        info!(
            endpoint = %cfg.source_endpoint,
            history = %cfg.history_path.display(),
            records = history.len(),
            windows = cfg.lookback_windows.len(),
            alerting = alerts.is_enabled(),
            archiving = archive.is_enabled(),
            policy = %history.policy(),
            "pipeline configured"
        );

        Ok(Pipeline::new(Components {
            fetcher: Arc::new(fetcher),
            history,
            stats: RollingStatsEngine::new(cfg.lookback_windows.clone(), features),
            detector: AnomalyDetector::new(cfg.anomaly_thresholds.clone()),
            alerts,
            archive,
            archive_dir: cfg.archive_dir.clone(),
            stage_timeout: cfg.stage_timeout,
        }))
    }
}
