use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::duration::{DurationParseError, parse_duration};

/// A trailing wall-clock window, anchored at the latest observation.
///
/// The label is the literal the window was configured with (`1h`, `24h`) and
/// doubles as the rule identifier on anomaly events and the column suffix in
/// the feature log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    label: String,
    span: TimeDelta,
}

impl WindowSpec {
    pub fn new(label: impl Into<String>, span: TimeDelta) -> Self {
        Self {
            label: label.into(),
            span,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn span(&self) -> TimeDelta {
        self.span
    }

    /// Inclusive lower bound of the window ending at `anchor`.
    pub fn start_for(&self, anchor: DateTime<Utc>) -> DateTime<Utc> {
        anchor
            .checked_sub_signed(self.span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn contains(&self, anchor: DateTime<Utc>, ts: DateTime<Utc>) -> bool {
        ts >= self.start_for(anchor) && ts <= anchor
    }
}

impl FromStr for WindowSpec {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let span = parse_duration(label)?;
        let span = TimeDelta::from_std(span)
            .map_err(|_| DurationParseError::Overflow(label.to_string()))?;
        Ok(Self::new(label, span))
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Fractional deviation thresholds keyed by window label.
///
/// A window without an entry is still summarized but never judged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thresholds(BTreeMap<String, Decimal>);

impl Thresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, window: impl Into<String>, threshold: Decimal) -> Self {
        self.0.insert(window.into(), threshold);
        self
    }

    pub fn insert(&mut self, window: impl Into<String>, threshold: Decimal) {
        self.0.insert(window.into(), threshold);
    }

    pub fn get(&self, window: &str) -> Option<Decimal> {
        self.0.get(window).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid threshold entry '{0}': expected <window>=<fraction>")]
pub struct ThresholdParseError(pub String);

impl FromStr for Thresholds {
    type Err = ThresholdParseError;

    /// Parses `1h=0.05,24h=0.10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Thresholds::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (window, value) = entry
                .split_once('=')
                .ok_or_else(|| ThresholdParseError(entry.to_string()))?;
            let value = Decimal::from_str(value.trim())
                .map_err(|_| ThresholdParseError(entry.to_string()))?;
            out.insert(window.trim(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn window_bounds_are_inclusive() {
        let w: WindowSpec = "1h".parse().unwrap();
        let anchor = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(w.label(), "1h");
        assert!(w.contains(anchor, anchor));
        assert!(w.contains(anchor, anchor - TimeDelta::hours(1)));
        assert!(!w.contains(anchor, anchor - TimeDelta::hours(1) - TimeDelta::seconds(1)));
        assert!(!w.contains(anchor, anchor + TimeDelta::seconds(1)));
    }

    #[test]
    fn thresholds_parse_from_pairs() {
        let t: Thresholds = "1h=0.05, 24h=0.10".parse().unwrap();
        assert_eq!(t.get("1h"), Some(dec!(0.05)));
        assert_eq!(t.get("24h"), Some(dec!(0.10)));
        assert_eq!(t.get("7d"), None);

        assert!("1h:0.05".parse::<Thresholds>().is_err());
        assert!("1h=abc".parse::<Thresholds>().is_err());
    }
}
