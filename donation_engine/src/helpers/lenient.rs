//! Readers for provider JSON fields whose type is not reliable.
//!
//! The provider sends amounts and ids sometimes as JSON numbers and sometimes as strings. These helpers accept either
//! and treat anything else as absent rather than failing the whole payload.
use std::str::FromStr;

use dpg_common::Money;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn money(value: &Value) -> Option<Money> {
    match value {
        Value::Number(n) => Money::from_str(&n.to_string()).ok(),
        Value::String(s) if !s.trim().is_empty() => Money::from_str(s).ok(),
        _ => None,
    }
}

pub fn string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A millisecond epoch timestamp, from an integer, a float, or a numeric string.
pub fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        },
        _ => None,
    }
}

pub fn opt_money<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Money>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(money(&value))
}

pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(string(&value))
}

/// Keeps the raw value, so that a malformed timestamp can be told apart from a missing one.
pub fn opt_raw<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(Some(value).filter(|v| !v.is_null()))
}
