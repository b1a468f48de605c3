use chrono::{DateTime, Utc};
use corelib::{FeatureRecord, Observation, Stat, WindowSpec, WindowStats};
use history::{FeatureLog, HistoryError, HistoryStore};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::stats::{mean, population_std};

/// Summarizes the history behind each new observation and records the
/// result in the feature log it owns.
pub struct RollingStatsEngine {
    windows: Vec<WindowSpec>,
    features: FeatureLog,
}

impl RollingStatsEngine {
    pub fn new(windows: Vec<WindowSpec>, features: FeatureLog) -> Self {
        Self { windows, features }
    }

    pub fn feature_log(&self) -> &FeatureLog {
        &self.features
    }

    /// Summarizes and appends the record to the feature log.
    ///
    /// If the append fails the feature log is unchanged and no record is
    /// returned.
    #[instrument(skip(self, latest, history), target = "engine", fields(ts = %latest.timestamp))]
    pub fn compute_features(
        &self,
        latest: &Observation,
        history: &HistoryStore,
    ) -> Result<FeatureRecord, HistoryError> {
        let record = self.summarize(latest, history)?;
        let receipt = self.features.append(&record)?;

        debug!(index = receipt.index, "feature record committed");
        Ok(record)
    }

    /// Same statistics as [`compute_features`](Self::compute_features),
    /// without touching the feature log.
    pub fn summarize(
        &self,
        latest: &Observation,
        history: &HistoryStore,
    ) -> Result<FeatureRecord, HistoryError> {
        let anchor = latest.timestamp;
        let samples = self.load_widest(anchor, history)?;

        let windows = self
            .windows
            .iter()
            .map(|w| window_stats(w, anchor, &samples))
            .collect();

        Ok(FeatureRecord {
            timestamp: anchor,
            value: latest.value,
            windows,
        })
    }

    /// One read covering every configured window.
    fn load_widest(
        &self,
        anchor: DateTime<Utc>,
        history: &HistoryStore,
    ) -> Result<Vec<Observation>, HistoryError> {
        let Some(widest) = self.windows.iter().max_by_key(|w| w.span()) else {
            return Ok(Vec::new());
        };

        let samples = history.read_range(widest.start_for(anchor), anchor).to_vec()?;
        debug!(window = %widest, samples = samples.len(), "loaded lookback range");
        Ok(samples)
    }
}

fn window_stats(window: &WindowSpec, anchor: DateTime<Utc>, samples: &[Observation]) -> WindowStats {
    let values: Vec<Decimal> = samples
        .iter()
        .filter(|o| window.contains(anchor, o.timestamp))
        .map(|o| o.value)
        .collect();

    WindowStats {
        window: window.label().to_string(),
        mean: Stat::from(mean(&values)),
        std: Stat::from(population_std(&values)),
    }
}
