//! Compact duration literals used in configuration: `30s`, `15m`, `1h`, `7d`.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration '{0}': expected <number><s|m|h|d>")]
    Malformed(String),

    #[error("duration '{0}' must be greater than zero")]
    Zero(String),

    #[error("duration '{0}' is too large")]
    Overflow(String),
}

pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DurationParseError::Malformed(s.to_string()))?;
    let (digits, unit) = s.split_at(split);

    let n: u64 = digits
        .parse()
        .map_err(|_| DurationParseError::Malformed(s.to_string()))?;

    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return Err(DurationParseError::Malformed(s.to_string())),
    };

    if n == 0 {
        return Err(DurationParseError::Zero(s.to_string()));
    }

    let secs = n
        .checked_mul(unit_secs)
        .ok_or_else(|| DurationParseError::Overflow(s.to_string()))?;

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration(" 1h "), Ok(Duration::from_secs(3_600)));
        assert_eq!(parse_duration("2d"), Ok(Duration::from_secs(172_800)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert!(matches!(parse_duration("h"), Err(DurationParseError::Malformed(_))));
        assert!(matches!(parse_duration("10"), Err(DurationParseError::Malformed(_))));
        assert!(matches!(parse_duration("10w"), Err(DurationParseError::Malformed(_))));
        assert!(matches!(parse_duration("-1h"), Err(DurationParseError::Malformed(_))));
        assert!(matches!(parse_duration("0m"), Err(DurationParseError::Zero(_))));
    }
}
