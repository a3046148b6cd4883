//! # Duration Text Format
//!
//! Parses and renders suffixed duration strings such as `30s`, `1m30s`,
//! `1.5h` or `250ms`.
//!
//! Supported units: `ns`, `us` (also `µs`/`μs`), `ms`, `s`, `m`, `h`.
//! A bare integer is read as a number of seconds.

use serde::de::{self, Visitor};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: String,
}

impl DurationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses a duration string.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Converts the textual duration form used in files, environment variables
/// and CLI overrides into a [`Duration`].
///
/// ## Usage
/// ```rust
/// use strata_config::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
/// ```
///
/// ## Rules
/// - Empty input and negative values are rejected
/// - `0` is accepted without a unit
/// - Segments may be fractional (`1.5s`) and compound (`1h2m3s`)
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(DurationError::new(input, "empty value"));
    }
    if text.starts_with('-') {
        return Err(DurationError::new(input, "negative durations are not allowed"));
    }
    let text = text.strip_prefix('+').unwrap_or(text);

    if text.bytes().all(|b| b.is_ascii_digit()) {
        let seconds: u64 = text
            .parse()
            .map_err(|_| DurationError::new(input, "value out of range"))?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total: u128 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DurationError::new(input, "expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::new(input, "missing unit"));
        }
        let scale = unit_nanos(unit)
            .ok_or_else(|| DurationError::new(input, format!("unknown unit {unit:?}")))?;

        total = total
            .checked_add(segment_nanos(input, number, scale)?)
            .ok_or_else(|| DurationError::new(input, "value out of range"))?;
        rest = tail;
    }

    let seconds = u64::try_from(total / NANOS_PER_SECOND)
        .map_err(|_| DurationError::new(input, "value out of range"))?;
    Ok(Duration::new(seconds, (total % NANOS_PER_SECOND) as u32))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

fn segment_nanos(input: &str, number: &str, scale: u128) -> Result<u128, DurationError> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(DurationError::new(input, "expected a number"));
    }
    if fraction.contains('.') {
        return Err(DurationError::new(input, "malformed number"));
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| DurationError::new(input, "value out of range"))?
    };
    let mut nanos = whole
        .checked_mul(scale)
        .ok_or_else(|| DurationError::new(input, "value out of range"))?;

    // Digits beyond nanosecond precision are truncated.
    let mut divisor: u128 = 1;
    for digit in fraction.bytes().take(18) {
        divisor *= 10;
        nanos += u128::from(digit - b'0') * scale / divisor;
    }
    Ok(nanos)
}

/// Renders a duration in the compact suffixed form accepted by
/// [`parse_duration`], for example `1h30m`, `1s500ms` or `0s`.
pub fn format_duration(duration: Duration) -> String {
    let mut nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (scale, unit) in [
        (NANOS_PER_HOUR, "h"),
        (NANOS_PER_MINUTE, "m"),
        (NANOS_PER_SECOND, "s"),
    ] {
        let count = nanos / scale;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            nanos %= scale;
        }
    }

    if nanos > 0 {
        if nanos % NANOS_PER_MILLI == 0 {
            out.push_str(&format!("{}ms", nanos / NANOS_PER_MILLI));
        } else if nanos % NANOS_PER_MICRO == 0 {
            out.push_str(&format!("{}us", nanos / NANOS_PER_MICRO));
        } else {
            out.push_str(&format!("{nanos}ns"));
        }
    }
    out
}

/// `#[serde(with = ...)]` adapter for [`Duration`] fields.
///
/// Serializes to the compact text form; deserializes from text or from an
/// integer number of seconds.
pub mod serde_duration {
    use super::{DurationVisitor, format_duration};
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a duration such as \"30s\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse_duration(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| E::custom("negative durations are not allowed"))
    }
}
