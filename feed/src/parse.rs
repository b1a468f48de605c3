//! Response decoding: locate the value and timestamp inside an arbitrary JSON
//! body via JSON pointers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use corelib::Observation;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::FetchError;

/// Epoch numbers above this are taken as milliseconds (year ~5138 in seconds).
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Where the sample lives inside the source's JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseShape {
    pub value_pointer: String,

    /// `None` stamps the observation with the fetch time.
    pub timestamp_pointer: Option<String>,
}

impl Default for ResponseShape {
    /// CoinGecko `simple/price?ids=bitcoin&vs_currencies=usd&include_last_updated_at=true`.
    fn default() -> Self {
        Self {
            value_pointer: "/bitcoin/usd".to_string(),
            timestamp_pointer: Some("/bitcoin/last_updated_at".to_string()),
        }
    }
}

pub fn parse_observation(
    body: &[u8],
    shape: &ResponseShape,
    fetched_at: DateTime<Utc>,
) -> Result<Observation, FetchError> {
    let doc: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::Format(format!("body is not JSON: {e}")))?;

    let raw_value = doc.pointer(&shape.value_pointer).ok_or_else(|| {
        FetchError::Format(format!("missing value at '{}'", shape.value_pointer))
    })?;
    let value = decimal_from_json(raw_value).ok_or_else(|| {
        FetchError::Format(format!(
            "value at '{}' is not a decimal: {raw_value}",
            shape.value_pointer
        ))
    })?;

    let timestamp = match &shape.timestamp_pointer {
        None => fetched_at,
        Some(ptr) => {
            let raw_ts = doc
                .pointer(ptr)
                .ok_or_else(|| FetchError::Format(format!("missing timestamp at '{ptr}'")))?;
            timestamp_from_json(raw_ts).ok_or_else(|| {
                FetchError::Format(format!("timestamp at '{ptr}' is not a UTC instant: {raw_ts}"))
            })?
        }
    };

    Ok(Observation::new(timestamp, value))
}

fn decimal_from_json(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn timestamp_from_json(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_epoch(i)
            } else {
                let secs = n.as_f64()?;
                if !secs.is_finite() {
                    return None;
                }
                DateTime::from_timestamp_millis((secs * 1_000.0).round() as i64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(from_epoch))
        }
        _ => None,
    }
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= EPOCH_MILLIS_CUTOFF {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}
