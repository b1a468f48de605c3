use corelib::{AnomalyEvent, FeatureRecord, Observation, Stat, Thresholds};
use tracing::debug;

/// Fixed-threshold rule over the rolling means.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    thresholds: Thresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, latest: &Observation, features: &FeatureRecord) -> Vec<AnomalyEvent> {
        let events = evaluate(latest, features, &self.thresholds);
        debug!(
            target: "engine",
            ts = %latest.timestamp,
            windows = features.windows.len(),
            events = events.len(),
            "anomaly rule evaluated"
        );
        events
    }
}

/// At most one event per window, in window order.
///
/// A window is judged only when both its mean and std are defined, a
/// threshold is configured for it, and the mean is non-zero. The comparison
/// `|value - mean| / mean >= threshold` is inclusive.
pub fn evaluate(
    latest: &Observation,
    features: &FeatureRecord,
    thresholds: &Thresholds,
) -> Vec<AnomalyEvent> {
    features
        .windows
        .iter()
        .filter_map(|w| {
            let (Stat::Value(mean), Stat::Value(_)) = (w.mean, w.std) else {
                return None;
            };
            let threshold = thresholds.get(&w.window)?;
            if mean.is_zero() {
                return None;
            }

            let pct = latest.value.checked_sub(mean)?.checked_div(mean)?;
            (pct.abs() >= threshold).then(|| AnomalyEvent {
                timestamp: latest.timestamp,
                observed_value: latest.value,
                rule_triggered: w.window.clone(),
                magnitude: pct,
                mean,
                threshold,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corelib::WindowStats;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn latest(value: Decimal) -> Observation {
        Observation::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(), value)
    }

    fn stats(window: &str, mean: Stat, std: Stat) -> WindowStats {
        WindowStats {
            window: window.into(),
            mean,
            std,
        }
    }

    fn features(value: Decimal, windows: Vec<WindowStats>) -> FeatureRecord {
        FeatureRecord {
            timestamp: latest(value).timestamp,
            value,
            windows,
        }
    }

    fn one_hour() -> Thresholds {
        Thresholds::new().with("1h", dec!(0.05))
    }

    // ---------------------------------------------------------
    // 1. Deviation above threshold fires with signed magnitude
    // ---------------------------------------------------------
    #[test]
    fn test_fires_above_threshold() {
        let f = features(
            dec!(106),
            vec![stats("1h", Stat::Value(dec!(100)), Stat::Value(dec!(2)))],
        );

        let events = evaluate(&latest(dec!(106)), &f, &one_hour());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_triggered, "1h");
        assert_eq!(events[0].magnitude, dec!(0.06));
        assert_eq!(events[0].observed_value, dec!(106));
        assert_eq!(events[0].threshold, dec!(0.05));
    }

    #[test]
    fn test_drop_fires_with_negative_magnitude() {
        let f = features(
            dec!(94),
            vec![stats("1h", Stat::Value(dec!(100)), Stat::Value(dec!(2)))],
        );

        let events = evaluate(&latest(dec!(94)), &f, &one_hour());

        assert_eq!(events[0].magnitude, dec!(-0.06));
    }

    // ---------------------------------------------------------
    // 2. Below threshold stays quiet, exact threshold fires
    // ---------------------------------------------------------
    #[test]
    fn test_threshold_is_inclusive() {
        let w = vec![stats("1h", Stat::Value(dec!(100)), Stat::Value(dec!(2)))];

        assert!(evaluate(&latest(dec!(104)), &features(dec!(104), w.clone()), &one_hour()).is_empty());
        assert!(
            evaluate(&latest(dec!(104.99)), &features(dec!(104.99), w.clone()), &one_hour())
                .is_empty()
        );
        assert_eq!(
            evaluate(&latest(dec!(105)), &features(dec!(105), w), &one_hour()).len(),
            1
        );
    }

    // ---------------------------------------------------------
    // 3. Undefined stats, missing threshold, zero mean → skipped
    // ---------------------------------------------------------
    #[test]
    fn test_skips_unjudgeable_windows() {
        let f = features(
            dec!(500),
            vec![
                stats("1h", Stat::Value(dec!(100)), Stat::InsufficientData),
                stats("24h", Stat::Value(dec!(100)), Stat::Value(dec!(1))),
                stats("7d", Stat::Value(Decimal::ZERO), Stat::Value(dec!(1))),
            ],
        );
        let thresholds = Thresholds::new()
            .with("1h", dec!(0.05))
            .with("7d", dec!(0.05));

        assert!(evaluate(&latest(dec!(500)), &f, &thresholds).is_empty());
    }

    // ---------------------------------------------------------
    // 4. Multiple windows keep declaration order
    // ---------------------------------------------------------
    #[test]
    fn test_events_follow_window_order() {
        let f = features(
            dec!(130),
            vec![
                stats("24h", Stat::Value(dec!(100)), Stat::Value(dec!(5))),
                stats("1h", Stat::Value(dec!(120)), Stat::Value(dec!(5))),
            ],
        );
        let thresholds = Thresholds::new()
            .with("1h", dec!(0.05))
            .with("24h", dec!(0.10));

        let rules: Vec<_> = evaluate(&latest(dec!(130)), &f, &thresholds)
            .into_iter()
            .map(|e| e.rule_triggered)
            .collect();

        assert_eq!(rules, vec!["24h", "1h"]);
    }
}
