//! Extended JSON conversion.
//!
//! Plain JSON cannot tell a date from a string or a 64-bit integer from a double. Exports mark
//! such values with single-key wrapper objects, which are mapped to exact [`Value`] variants:
//!
//! - `{"$date": "2024-01-02T03:04:05.678Z"}`, `{"$date": 1704164645678}` or
//!   `{"$date": {"$numberLong": "1704164645678"}}` → [`Value::Date`]
//! - `{"$numberLong": "9007199254740993"}`, `{"$numberInt": "7"}` → [`Value::Int`]
//! - `{"$numberDouble": "NaN"}` (also `Infinity`, `-Infinity`, decimal text) → [`Value::Float`]
//! - `{"$oid": "<24 hex chars>"}` → [`Value::ObjectId`]
//! - `{"$binary": {"base64": "...", "subType": "00"}}` or the legacy
//!   `{"$binary": "...", "$type": "00"}` → [`Value::Binary`]
//!
//! Any other object becomes [`Value::Object`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, json};

use crate::types::{ObjectId, Record, Value};

/// Convert a parsed JSON value into a [`Value`], honoring extended type tags.
pub fn from_json(v: serde_json::Value) -> Result<Value, String> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => Ok(number_value(&n)),
        serde_json::Value::String(s) => Ok(Value::String(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(map) => object_value(map),
    }
}

/// Convert a JSON object into a [`Record`]. Fails on non-objects.
pub fn record_from_json(v: serde_json::Value) -> Result<Record, String> {
    match v {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| from_json(v).map(|v| (k, v)))
            .collect(),
        other => Err(format!("expected a json object, found {}", json_type_name(&other))),
    }
}

/// Render a [`Value`] as relaxed extended JSON.
pub fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => serde_json::Value::Number(n),
            None => json!({ "$numberDouble": non_finite_text(*f) }),
        },
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => json!({ "$date": d.to_rfc3339_opts(SecondsFormat::Millis, true) }),
        Value::Binary { subtype, bytes } => json!({
            "$binary": { "base64": STANDARD.encode(bytes), "subType": hex::encode([*subtype]) }
        }),
        Value::ObjectId(id) => json!({ "$oid": id.to_hex() }),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(record) => serde_json::Value::Object(
            record
                .iter()
                .map(|(k, v)| (k.to_string(), to_json(v)))
                .collect(),
        ),
    }
}

fn number_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        // u64 beyond i64::MAX or a decimal.
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn object_value(map: Map<String, serde_json::Value>) -> Result<Value, String> {
    if map.len() == 1 {
        let tag = map.keys().next().cloned().unwrap_or_default();
        if let Some(inner) = map.get(&tag) {
            match tag.as_str() {
                "$oid" => return oid_value(inner),
                "$date" => return date_value(inner),
                "$numberLong" => return number_long(inner).map(Value::Int),
                "$numberInt" => return number_int(inner).map(Value::Int),
                "$numberDouble" => return number_double(inner).map(Value::Float),
                "$binary" => return binary_value(inner),
                _ => {}
            }
        }
    } else if map.len() == 2 && map.contains_key("$binary") && map.contains_key("$type") {
        return match (map.get("$binary"), map.get("$type")) {
            (Some(serde_json::Value::String(b64)), Some(subtype)) => decode_base64(b64, Some(subtype)),
            _ => Err("legacy $binary must be a base64 string".to_string()),
        };
    }

    map.into_iter()
        .map(|(k, v)| from_json(v).map(|v| (k, v)))
        .collect::<Result<Record, _>>()
        .map(Value::Object)
}

fn oid_value(v: &serde_json::Value) -> Result<Value, String> {
    v.as_str()
        .and_then(ObjectId::parse_str)
        .map(Value::ObjectId)
        .ok_or_else(|| format!("invalid $oid {v}"))
}

fn date_value(v: &serde_json::Value) -> Result<Value, String> {
    let millis = match v {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid $date '{s}': {e}"))?
            .timestamp_millis(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("invalid $date millis {n}"))?,
        serde_json::Value::Object(inner) => match inner.get("$numberLong") {
            Some(long) if inner.len() == 1 => number_long(long)?,
            _ => return Err(format!("invalid $date {v}")),
        },
        _ => return Err(format!("invalid $date {v}")),
    };
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(Value::Date)
        .ok_or_else(|| format!("$date out of range: {millis}"))
}

fn number_long(v: &serde_json::Value) -> Result<i64, String> {
    v.as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| format!("invalid $numberLong {v}"))
}

fn number_int(v: &serde_json::Value) -> Result<i64, String> {
    v.as_str()
        .and_then(|s| s.parse::<i32>().ok())
        .map(i64::from)
        .ok_or_else(|| format!("invalid $numberInt {v}"))
}

fn number_double(v: &serde_json::Value) -> Result<f64, String> {
    match v.as_str() {
        Some("NaN") => Ok(f64::NAN),
        Some("Infinity") => Ok(f64::INFINITY),
        Some("-Infinity") => Ok(f64::NEG_INFINITY),
        Some(s) => s.parse::<f64>().map_err(|e| format!("invalid $numberDouble '{s}': {e}")),
        None => Err(format!("invalid $numberDouble {v}")),
    }
}

fn binary_value(v: &serde_json::Value) -> Result<Value, String> {
    match v.get("base64").and_then(|b| b.as_str()) {
        Some(b64) => decode_base64(b64, v.get("subType")),
        None => Err(format!("invalid $binary {v}")),
    }
}

/// A missing subtype means generic binary (`00`).
fn decode_base64(b64: &str, subtype: Option<&serde_json::Value>) -> Result<Value, String> {
    let subtype = match subtype {
        None => 0,
        Some(v) => v
            .as_str()
            .filter(|s| (1..=2).contains(&s.len()))
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| format!("invalid $binary subtype {v}"))?,
    };
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| format!("invalid $binary base64: {e}"))?;
    Ok(Value::Binary { subtype, bytes })
}

fn non_finite_text(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

pub(crate) fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
