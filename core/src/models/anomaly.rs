use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// A flagged deviation of the latest value from a window's rolling mean.
///
/// Ephemeral: produced by the detector, consumed once by the alert
/// dispatcher, never written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyEvent {
    pub timestamp: DateTime<Utc>,
    pub observed_value: Decimal,

    /// Label of the window whose rule fired.
    pub rule_triggered: String,

    /// Signed fractional change from the window mean.
    pub magnitude: Decimal,

    pub mean: Decimal,
    pub threshold: Decimal,
}
