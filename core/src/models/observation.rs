use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One timestamped price sample.
///
/// Immutable once recorded; the history log stores it exactly as fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: Decimal) -> Self {
        Self { timestamp, value }
    }
}
