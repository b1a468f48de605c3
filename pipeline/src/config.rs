use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use corelib::duration::parse_duration;
use corelib::{Thresholds, WindowSpec};
use history::OrderingPolicy;
use rust_decimal::Decimal;
use serde::Deserialize;

const ENV_PREFIX: &str = "PRICEWATCH_";

pub const DEFAULT_SOURCE_ENDPOINT: &str = "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd&include_last_updated_at=true";

/// Everything a cycle needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Price API returning JSON.
    pub source_endpoint: String,

    /// JSON pointer to the price inside the response.
    pub value_pointer: String,

    /// JSON pointer to the source timestamp; `None` stamps with fetch time.
    pub timestamp_pointer: Option<String>,

    /// Trailing windows, in the order their columns appear in the feature log.
    pub lookback_windows: Vec<WindowSpec>,

    /// Fractional deviation per window label that raises an anomaly.
    pub anomaly_thresholds: Thresholds,

    pub history_path: PathBuf,
    pub archive_dir: PathBuf,
    pub feature_path: PathBuf,

    /// Webhook for alert text. Unset disables alerting.
    pub notification_sink_uri: Option<String>,

    /// `file://`, bare path or `http(s)://` replica. Unset disables archiving.
    pub archive_sink_uri: Option<String>,

    pub ordering_policy: OrderingPolicy,

    /// Bound on one HTTP request to the source or a sink.
    pub request_timeout: Duration,

    /// Bound on each external stage (fetch, every push, every notify).
    pub stage_timeout: Duration,

    /// Label used in alert text.
    pub asset: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_endpoint: DEFAULT_SOURCE_ENDPOINT.to_string(),
            value_pointer: "/bitcoin/usd".to_string(),
            timestamp_pointer: Some("/bitcoin/last_updated_at".to_string()),
            lookback_windows: vec![
                WindowSpec::new("1h", TimeDelta::hours(1)),
                WindowSpec::new("24h", TimeDelta::hours(24)),
            ],
            anomaly_thresholds: Thresholds::new()
                .with("1h", Decimal::new(5, 2))
                .with("24h", Decimal::new(10, 2)),
            history_path: PathBuf::from("data/raw/history.csv"),
            archive_dir: PathBuf::from("data/snapshots"),
            feature_path: PathBuf::from("data/processed/features.csv"),
            notification_sink_uri: None,
            archive_sink_uri: None,
            ordering_policy: OrderingPolicy::Reject,
            request_timeout: Duration::from_secs(10),
            stage_timeout: Duration::from_secs(30),
            asset: "BTC/USD".to_string(),
        }
    }
}

/// Flat file/env layer: every key optional, every value textual.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    source_endpoint: Option<String>,
    value_pointer: Option<String>,
    timestamp_pointer: Option<String>,
    lookback_windows: Option<String>,
    anomaly_thresholds: Option<String>,
    history_path: Option<String>,
    archive_dir: Option<String>,
    feature_path: Option<String>,
    notification_sink_uri: Option<String>,
    archive_sink_uri: Option<String>,
    ordering_policy: Option<String>,
    request_timeout: Option<String>,
    stage_timeout: Option<String>,
    asset: Option<String>,
}

impl RawConfig {
    /// Overwrites fields with whatever `lookup` finds under `PRICEWATCH_<KEY>`.
    fn overlay<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(&format!("{ENV_PREFIX}{}", key.to_ascii_uppercase()));
        let fields: [(&str, &mut Option<String>); 14] = [
            ("source_endpoint", &mut self.source_endpoint),
            ("value_pointer", &mut self.value_pointer),
            ("timestamp_pointer", &mut self.timestamp_pointer),
            ("lookback_windows", &mut self.lookback_windows),
            ("anomaly_thresholds", &mut self.anomaly_thresholds),
            ("history_path", &mut self.history_path),
            ("archive_dir", &mut self.archive_dir),
            ("feature_path", &mut self.feature_path),
            ("notification_sink_uri", &mut self.notification_sink_uri),
            ("archive_sink_uri", &mut self.archive_sink_uri),
            ("ordering_policy", &mut self.ordering_policy),
            ("request_timeout", &mut self.request_timeout),
            ("stage_timeout", &mut self.stage_timeout),
            ("asset", &mut self.asset),
        ];
        for (key, slot) in fields {
            if let Some(v) = env(key) {
                *slot = Some(v);
            }
        }
    }

    fn resolve(self) -> Result<PipelineConfig> {
        let mut cfg = PipelineConfig::default();

        if let Some(v) = self.source_endpoint {
            cfg.source_endpoint = v.trim().to_string();
        }
        if let Some(v) = self.value_pointer {
            cfg.value_pointer = v.trim().to_string();
        }
        if let Some(v) = self.timestamp_pointer {
            cfg.timestamp_pointer = non_empty(v);
        }
        if let Some(v) = self.lookback_windows {
            cfg.lookback_windows = parse_windows(&v)?;
        }
        if let Some(v) = self.anomaly_thresholds {
            cfg.anomaly_thresholds = v
                .parse::<Thresholds>()
                .with_context(|| format!("invalid anomaly_thresholds '{v}'"))?;
        }
        if let Some(v) = self.history_path {
            cfg.history_path = PathBuf::from(v.trim());
        }
        if let Some(v) = self.archive_dir {
            cfg.archive_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = self.feature_path {
            cfg.feature_path = PathBuf::from(v.trim());
        }
        if let Some(v) = self.notification_sink_uri {
            cfg.notification_sink_uri = non_empty(v);
        }
        if let Some(v) = self.archive_sink_uri {
            cfg.archive_sink_uri = non_empty(v);
        }
        if let Some(v) = self.ordering_policy {
            cfg.ordering_policy = v
                .parse::<OrderingPolicy>()
                .map_err(anyhow::Error::msg)
                .context("invalid ordering_policy")?;
        }
        if let Some(v) = self.request_timeout {
            cfg.request_timeout =
                parse_duration(&v).with_context(|| format!("invalid request_timeout '{v}'"))?;
        }
        if let Some(v) = self.stage_timeout {
            cfg.stage_timeout =
                parse_duration(&v).with_context(|| format!("invalid stage_timeout '{v}'"))?;
        }
        if let Some(v) = self.asset {
            cfg.asset = v.trim().to_string();
        }

        Ok(cfg)
    }
}

impl PipelineConfig {
    /// Optional TOML file, then process environment on top, then validation.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let raw = match file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                parse_toml(&content)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => RawConfig::default(),
        };
        Self::layered(raw, |key| std::env::var(key).ok())
    }

    /// Environment-style resolution against an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::layered(RawConfig::default(), lookup)
    }

    /// File contents plus an environment lookup applied on top.
    pub fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::layered(parse_toml(content)?, lookup)
    }

    fn layered<F>(mut raw: RawConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        raw.overlay(lookup);
        let cfg = raw.resolve()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_endpoint.is_empty() {
            bail!("source_endpoint must be set");
        }
        if self.lookback_windows.is_empty() {
            bail!("at least one lookback window must be configured");
        }

        let mut labels = HashSet::new();
        for w in &self.lookback_windows {
            if !labels.insert(w.label()) {
                bail!("duplicate lookback window '{}'", w.label());
            }
        }

        for (window, threshold) in self.anomaly_thresholds.iter() {
            if !labels.contains(window) {
                bail!("threshold for '{window}' does not match any lookback window");
            }
            if threshold <= Decimal::ZERO {
                bail!("threshold for '{window}' must be positive");
            }
        }

        if self.asset.is_empty() {
            bail!("asset label must not be empty");
        }

        Ok(())
    }
}

fn parse_toml(content: &str) -> Result<RawConfig> {
    toml::from_str(content).context("failed to parse TOML config")
}

fn parse_windows(raw: &str) -> Result<Vec<WindowSpec>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<WindowSpec>()
                .with_context(|| format!("invalid lookback window '{s}'"))
        })
        .collect()
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_validate() {
        let cfg = PipelineConfig::from_lookup(|_| None).unwrap();

        assert_eq!(cfg.lookback_windows.len(), 2);
        assert_eq!(cfg.anomaly_thresholds.get("1h"), Some(Decimal::new(5, 2)));
        assert_eq!(cfg.ordering_policy, OrderingPolicy::Reject);
        assert_eq!(cfg.stage_timeout, Duration::from_secs(30));
        assert!(cfg.notification_sink_uri.is_none());
    }

    #[test]
    fn environment_values_are_parsed() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            ("PRICEWATCH_LOOKBACK_WINDOWS", "15m, 4h"),
            ("PRICEWATCH_ANOMALY_THRESHOLDS", "15m=0.02"),
            ("PRICEWATCH_ORDERING_POLICY", "reorder"),
            ("PRICEWATCH_TIMESTAMP_POINTER", ""),
            ("PRICEWATCH_STAGE_TIMEOUT", "5s"),
            ("PRICEWATCH_NOTIFICATION_SINK_URI", "https://hooks.example.com/x"),
        ]))
        .unwrap();

        let labels: Vec<_> = cfg.lookback_windows.iter().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["15m", "4h"]);
        assert_eq!(cfg.ordering_policy, OrderingPolicy::Reorder);
        assert_eq!(cfg.timestamp_pointer, None);
        assert_eq!(cfg.stage_timeout, Duration::from_secs(5));
        assert_eq!(
            cfg.notification_sink_uri.as_deref(),
            Some("https://hooks.example.com/x")
        );
    }

    #[test]
    fn environment_overrides_file() {
        let toml = r#"
            history_path = "/var/lib/pricewatch/history.csv"
            asset = "ETH/USD"
            lookback_windows = "1h"
            anomaly_thresholds = "1h=0.03"
        "#;

        let cfg = PipelineConfig::from_toml_str_with(
            toml,
            lookup(&[("PRICEWATCH_ASSET", "SOL/USD")]),
        )
        .unwrap();

        assert_eq!(cfg.asset, "SOL/USD");
        assert_eq!(cfg.history_path, PathBuf::from("/var/lib/pricewatch/history.csv"));
        assert_eq!(cfg.lookback_windows.len(), 1);
    }

    #[test]
    fn unknown_file_key_is_rejected() {
        assert!(PipelineConfig::from_toml_str_with("histroy_path = \"x\"", |_| None).is_err());
    }

    #[test]
    fn validation_catches_inconsistent_settings() {
        let cases = [
            vec![("PRICEWATCH_LOOKBACK_WINDOWS", "")],
            vec![("PRICEWATCH_LOOKBACK_WINDOWS", "1h,1h")],
            vec![("PRICEWATCH_ANOMALY_THRESHOLDS", "7d=0.1")],
            vec![("PRICEWATCH_ANOMALY_THRESHOLDS", "1h=0")],
            vec![("PRICEWATCH_ANOMALY_THRESHOLDS", "1h=-0.05")],
            vec![("PRICEWATCH_LOOKBACK_WINDOWS", "1x")],
            vec![("PRICEWATCH_ORDERING_POLICY", "shuffle")],
            vec![("PRICEWATCH_STAGE_TIMEOUT", "0s")],
        ];

        for pairs in cases {
            assert!(
                PipelineConfig::from_lookup(lookup(&pairs)).is_err(),
                "expected {pairs:?} to be rejected"
            );
        }
    }
}
