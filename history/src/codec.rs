//! Row encoding shared by the raw and feature logs.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use corelib::{Observation, Stat};
use csv::StringRecord;
use rust_decimal::Decimal;

/// RFC 3339 with `Z` and only as many fractional digits as the instant needs,
/// so timestamps survive a write/read cycle exactly.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{s}': {e}"))
}

pub(crate) fn parse_decimal(s: &str) -> Result<Decimal, String> {
    Decimal::from_str(s.trim()).map_err(|e| format!("bad decimal '{s}': {e}"))
}

pub(crate) fn format_stat(stat: &Stat) -> String {
    match stat {
        Stat::Value(v) => v.to_string(),
        Stat::InsufficientData => String::new(),
    }
}

pub(crate) fn parse_stat(s: &str) -> Result<Stat, String> {
    if s.trim().is_empty() {
        Ok(Stat::InsufficientData)
    } else {
        parse_decimal(s).map(Stat::Value)
    }
}

/// Serializes one record, terminator included, so it can be written with a
/// single `write_all`.
pub(crate) fn encode_line<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    w.write_record(fields)?;
    w.into_inner().map_err(|e| {
        let err = e.error();
        csv::Error::from(std::io::Error::new(err.kind(), err.to_string()))
    })
}

pub(crate) fn encode_observation(obs: &Observation) -> [String; 2] {
    [format_ts(&obs.timestamp), obs.value.to_string()]
}

pub(crate) fn decode_observation(rec: &StringRecord) -> Result<Observation, String> {
    let ts = rec.get(0).ok_or("missing timestamp column")?;
    let value = rec.get(1).ok_or("missing value column")?;
    Ok(Observation::new(parse_ts(ts)?, parse_decimal(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn timestamps_keep_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_714_564_800, 123_456_789).unwrap();
        let text = format_ts(&ts);

        assert_eq!(text, "2024-05-01T12:00:00.123456789Z");
        assert_eq!(parse_ts(&text).unwrap(), ts);

        let whole = Utc.timestamp_opt(1_714_564_800, 0).unwrap();
        assert_eq!(format_ts(&whole), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn observation_line_is_plain_csv() {
        let obs = Observation::new(Utc.timestamp_opt(1_714_564_800, 0).unwrap(), dec!(100.50));
        let line = encode_line(&encode_observation(&obs)).unwrap();
        assert_eq!(line, b"2024-05-01T12:00:00Z,100.50\n");
    }

    #[test]
    fn empty_cell_is_insufficient_data() {
        assert_eq!(parse_stat("").unwrap(), Stat::InsufficientData);
        assert_eq!(parse_stat("8.5").unwrap(), Stat::Value(dec!(8.5)));
        assert_eq!(format_stat(&Stat::InsufficientData), "");
        assert!(parse_stat("x").is_err());
    }
}
