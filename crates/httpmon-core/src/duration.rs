use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: &'static str,
}

/// Suffix to nanoseconds multiplier (longer suffixes first so "ms" wins over "m").
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Parse Go-style duration strings such as "5s", "1m30s", "250ms" or "1.5h".
///
/// A bare "0" is accepted. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let input = s.trim();
    let err = |reason| DurationError {
        input: s.to_string(),
        reason,
    };

    if input.is_empty() {
        return Err(err("empty"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.starts_with('-') {
        return Err(err("negative"));
    }

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    let mut total_nanos = 0f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| err("missing unit"))?;
        if number_len == 0 {
            return Err(err("expected a number"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| err("malformed number"))?;
        rest = &rest[number_len..];

        let (suffix, multiplier) = UNITS
            .iter()
            .find(|(suffix, _)| rest.starts_with(suffix))
            .ok_or_else(|| err("unknown unit"))?;
        total_nanos += value * multiplier;
        rest = &rest[suffix.len()..];
    }

    Ok(Duration::from_nanos(total_nanos as u64))
}
