//! Typed access to JSON-RPC `arguments` objects.
//!
//! Agents are loose about types: ids arrive as numbers or as numeric
//! strings, and empty strings mean "not given". These helpers normalise
//! that once so capabilities can stay short.

use chrono::NaiveDate;
use serde_json::Value;

use crate::errors::{McpError, McpResult};

fn missing(key: &str) -> McpError {
    McpError::invalid_params(format!("Missing required parameter: {}", key))
}

fn wrong_type(key: &str, expected: &str) -> McpError {
    McpError::invalid_params(format!("Parameter '{}' must be {}", key, expected))
}

/// A non-blank string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A string argument that must be present and non-blank.
pub fn required_str<'a>(args: &'a Value, key: &str) -> McpResult<&'a str> {
    optional_str(args, key).ok_or_else(|| missing(key))
}

/// A non-negative integer, accepting numeric strings.
pub fn optional_u64(args: &Value, key: &str) -> McpResult<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| wrong_type(key, "a non-negative integer")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| wrong_type(key, "a non-negative integer")),
        Some(_) => Err(wrong_type(key, "a non-negative integer")),
    }
}

pub fn required_u64(args: &Value, key: &str) -> McpResult<u64> {
    optional_u64(args, key)?.ok_or_else(|| missing(key))
}

/// A decimal number, accepting numeric strings.
pub fn optional_f64(args: &Value, key: &str) -> McpResult<Option<f64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| wrong_type(key, "a number")),
        Some(_) => Err(wrong_type(key, "a number")),
    }
}

pub fn required_f64(args: &Value, key: &str) -> McpResult<f64> {
    optional_f64(args, key)?.ok_or_else(|| missing(key))
}

/// A project-style key: a non-blank string, or a number rendered as one.
pub fn optional_key(args: &Value, key: &str) -> Option<String> {
    match args.get(key) {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => optional_str(args, key).map(str::to_string),
    }
}

pub fn required_key(args: &Value, key: &str) -> McpResult<String> {
    optional_key(args, key).ok_or_else(|| missing(key))
}

/// A `YYYY-MM-DD` date.
pub fn optional_date(args: &Value, key: &str) -> McpResult<Option<NaiveDate>> {
    match optional_str(args, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| wrong_type(key, "a date in YYYY-MM-DD format")),
    }
}

/// A boolean, accepting `"true"` / `"false"` strings.
pub fn optional_bool(args: &Value, key: &str) -> McpResult<Option<bool>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim() {
            "" => Ok(None),
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(wrong_type(key, "a boolean")),
        },
        Some(_) => Err(wrong_type(key, "a boolean")),
    }
}

/// A signed integer that never fails: anything unparsable is absent.
///
/// Used for paging knobs, which are clamped afterwards.
pub fn lenient_i64(args: &Value, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
