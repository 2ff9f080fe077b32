//! Explicit validation of tool arguments.
//!
//! Models are sloppy with types: integers arrive as strings, single-argument
//! tools get a bare value instead of an object, dates come with a time part.
//! These helpers accept the harmless variants and reject the rest with a
//! message the model can act on.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use super::ToolError;

// ---

/// Normalize the raw `action_input` into an argument object.
///
/// A non-object value is accepted only for single-parameter tools and is
/// bound to that parameter.
pub fn object(args: Value, params: &[&str]) -> Result<Map<String, Value>, ToolError> {
    // ---
    match (args, params) {
        (Value::Object(map), _) => Ok(map),
        (Value::Null, []) => Ok(Map::new()),
        (value, [only]) if !value.is_null() => {
            let mut map = Map::new();
            map.insert((*only).to_string(), value);
            Ok(map)
        }
        (value, _) => Err(ToolError::InvalidArguments(format!(
            "expected an object with keys {params:?}, got `{value}`"
        ))),
    }
}

fn required<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a Value, ToolError> {
    args.get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument `{key}`")))
}

/// A non-blank string argument, trimmed.
pub fn string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    // ---
    match required(args, key)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "argument `{key}` must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "argument `{key}` must be a string, got `{other}`"
        ))),
    }
}

/// A signed integer; numeric strings and integral floats are accepted.
pub fn integer(args: &Map<String, Value>, key: &str) -> Result<i64, ToolError> {
    // ---
    let invalid = |v: &Value| {
        ToolError::InvalidArguments(format!("argument `{key}` must be an integer, got `{v}`"))
    };

    let value = required(args, key)?;
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(i),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
            _ => Err(invalid(value)),
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid(value)),
        _ => Err(invalid(value)),
    }
}

/// An ISO calendar date (`YYYY-MM-DD`).
///
/// Full RFC 3339 timestamps, as returned by the date arithmetic tools, are
/// accepted and reduced to their calendar date.
pub fn date(args: &Map<String, Value>, key: &str) -> Result<NaiveDate, ToolError> {
    // ---
    let raw = string(args, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.date_naive()))
        .map_err(|_| {
            ToolError::InvalidArguments(format!(
                "argument `{key}` must be an ISO date like 2024-03-01, got `{raw}`"
            ))
        })
}
