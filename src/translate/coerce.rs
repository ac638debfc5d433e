//! Value coercion against a field's simple type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::SimpleType;
use crate::value::Value;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").unwrap());

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Coerce one JSON scalar. Null passes through untouched.
///
/// Returns `None` when the value cannot represent the type.
pub fn coerce(simple: SimpleType, json: &serde_json::Value) -> Option<Value> {
    let value = Value::from_json(json)?;
    if value.is_null() {
        return Some(Value::Null);
    }
    match simple {
        SimpleType::Key => integer(&value).map(Value::Int),
        SimpleType::Number => number(&value),
        SimpleType::Boolean => boolean(&value).map(Value::Bool),
        SimpleType::String => match value {
            Value::Text(s) => Some(Value::Text(s)),
            Value::Int(_) | Value::Float(_) => Some(Value::Text(value.to_string())),
            Value::Bool(_) | Value::Null => None,
        },
        SimpleType::Date => text(&value).and_then(date).map(Value::Text),
        SimpleType::Time => text(&value).and_then(time).map(Value::Text),
        SimpleType::Datetime => text(&value).and_then(datetime).map(Value::Text),
    }
}

fn text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        Value::Text(s) if INTEGER.is_match(s.trim()) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number(value: &Value) -> Option<Value> {
    match value {
        Value::Int(_) | Value::Float(_) => Some(value.clone()),
        Value::Text(s) => {
            let s = s.trim();
            if INTEGER.is_match(s) {
                s.parse().ok().map(Value::Int)
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Value::Float)
            }
        }
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn date(s: &str) -> Option<String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .map(|d| d.format(DATE_FORMAT).to_string())
}

fn time(s: &str) -> Option<String> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
        .map(|t| t.format(TIME_FORMAT).to_string())
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS`; a bare date means midnight.
fn datetime(s: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATETIME_FORMAT))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(parsed.format(DATETIME_FORMAT).to_string())
}
