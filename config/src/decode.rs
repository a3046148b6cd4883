//! # Decode Pipeline
//!
//! Turns the merged key space into a typed [`Config`].
//!
//! Every known key path is coerced by the decode function for its declared
//! [`FieldKind`]; all coercion failures are collected and reported together.
//! Keys with no descriptor are skipped.

use crate::config::Config;
use crate::duration::{format_duration, parse_duration};
use crate::error::{ConfigError, FieldError};
use crate::precedence::{flatten, insert_path};
use crate::registry::{FieldKind, registry};
use crate::source::KeyMap;
use serde_json::{Number, Value};
use std::time::Duration;
use tracing::debug;

type Coerced = Result<Value, String>;

/// Decodes a merged key space into a typed snapshot.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Applies weak-typing rules deterministically so that values arriving as
/// text (environment, CLI) decode the same way as native file values.
///
/// ## Rules
/// - Durations: suffixed text (`"30s"`, `"1m30s"`), or a bare number of seconds
/// - String lists: sequences element by element, or comma-separated text
/// - Booleans: native, `1/t/T/TRUE/true/True`, `0/f/F/FALSE/false/False`
/// - Numbers: native or trimmed numeric text
/// - Secrets: plain text wrapped into the redacting type
///
/// ## Error Handling
/// Returns `ConfigError::Decode` listing every field that failed.
pub fn decode(tree: &KeyMap) -> Result<Config, ConfigError> {
    let registry = registry();
    let mut canonical = KeyMap::new();
    let mut errors = Vec::new();

    for (key_path, raw) in flatten(tree) {
        let Some(descriptor) = registry.get(&key_path) else {
            debug!(key_path = %key_path, "Ignoring unknown configuration key");
            continue;
        };
        match decode_value(descriptor.kind, &raw) {
            Ok(value) => insert_path(&mut canonical, &key_path, value)?,
            Err(message) => errors.push(FieldError::new(key_path, message)),
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::Decode { errors });
    }

    serde_json::from_value(Value::Object(canonical)).map_err(|e| ConfigError::Decode {
        errors: vec![FieldError::new("<root>", e.to_string())],
    })
}

/// Coerces one raw value to the canonical representation of `kind`.
pub fn decode_value(kind: FieldKind, raw: &Value) -> Coerced {
    match kind {
        FieldKind::String => decode_string(raw),
        FieldKind::Integer => decode_integer(raw),
        FieldKind::Unsigned => decode_unsigned(raw),
        FieldKind::Float => decode_float(raw),
        FieldKind::Boolean => decode_boolean(raw),
        FieldKind::Duration => decode_duration(raw),
        FieldKind::StringList => decode_string_list(raw),
        FieldKind::Secret => decode_secret(raw),
    }
}

fn mismatch(kind: FieldKind, raw: &Value) -> String {
    format!("expected {}, got {raw}", kind.as_str())
}

fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn decode_string(raw: &Value) -> Coerced {
    scalar_text(raw)
        .map(Value::String)
        .ok_or_else(|| mismatch(FieldKind::String, raw))
}

fn decode_secret(raw: &Value) -> Coerced {
    scalar_text(raw)
        .map(Value::String)
        .ok_or_else(|| mismatch(FieldKind::Secret, raw))
}

fn decode_integer(raw: &Value) -> Coerced {
    let parsed = match raw {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| mismatch(FieldKind::Integer, raw))
}

fn decode_unsigned(raw: &Value) -> Coerced {
    let parsed = match raw {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| mismatch(FieldKind::Unsigned, raw))
}

fn decode_float(raw: &Value) -> Coerced {
    let parsed = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| mismatch(FieldKind::Float, raw))
}

fn decode_boolean(raw: &Value) -> Coerced {
    let parsed = match raw {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(text) => parse_bool(text.trim()),
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| mismatch(FieldKind::Boolean, raw))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn decode_duration(raw: &Value) -> Coerced {
    let parsed = match raw {
        Value::String(text) => parse_duration(text).map_err(|e| e.to_string())?,
        Value::Number(number) => number
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| mismatch(FieldKind::Duration, raw))?,
        _ => return Err(mismatch(FieldKind::Duration, raw)),
    };
    Ok(Value::String(format_duration(parsed)))
}

fn decode_string_list(raw: &Value) -> Coerced {
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                scalar_text(item)
                    .map(Value::String)
                    .ok_or_else(|| format!("list elements must be scalars, got {item}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(text) => Ok(Value::Array(
            text.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        _ => Err(mismatch(FieldKind::StringList, raw)),
    }
}
