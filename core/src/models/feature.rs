use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// A windowed statistic, or the sentinel for "not enough samples".
///
/// Consumers must treat `InsufficientData` as "no opinion", never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stat {
    Value(Decimal),
    InsufficientData,
}

impl Stat {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Stat::Value(v) => Some(*v),
            Stat::InsufficientData => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Stat::Value(_))
    }
}

impl From<Option<Decimal>> for Stat {
    fn from(v: Option<Decimal>) -> Self {
        v.map_or(Stat::InsufficientData, Stat::Value)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stat::Value(v) => write!(f, "{v}"),
            Stat::InsufficientData => f.write_str("insufficient data"),
        }
    }
}

/// Mean and population standard deviation over one lookback window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub window: String,
    pub mean: Stat,
    pub std: Stat,
}

/// Derived row: the anchor observation plus one `WindowStats` per configured
/// window, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRecord {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
    pub windows: Vec<WindowStats>,
}

impl FeatureRecord {
    pub fn window(&self, label: &str) -> Option<&WindowStats> {
        self.windows.iter().find(|w| w.window == label)
    }
}
