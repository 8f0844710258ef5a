//! Text encoding of [`Value`]s for the blocking call path.
//!
//! JSON cannot carry binary buffers or error objects, so both are rewritten
//! into tagged objects under a reserved marker key:
//!
//! ```json
//! {"__sqlworker_bytes__": [1, 2, 3]}
//! {"__sqlworker_error__": {"message": "...", "stack": "...", "code": "..."}}
//! ```
//!
//! [`deserialize`] recognises the markers and restores the original values, so
//! `deserialize(&serialize(v)?)?` reproduces `v` for any value without
//! non-finite floats.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use crate::error::{BridgeError, BridgeResult};
use crate::value::{ErrorObject, Value};

/// Marker key of an encoded binary buffer.
pub const BYTES_MARKER: &str = "__sqlworker_bytes__";
/// Marker key of an encoded error object.
pub const ERROR_MARKER: &str = "__sqlworker_error__";

const MESSAGE_KEY: &str = "message";
const STACK_KEY: &str = "stack";

/// Encodes `value` as JSON text.
///
/// Non-finite floats have no JSON form and are written as `null`.
///
/// # Errors
///
/// Returns [`BridgeError::Serialization`] if the JSON writer fails.
pub fn serialize(value: &Value) -> BridgeResult<String> {
    serde_json::to_string(&to_json(value)).map_err(|e| BridgeError::Serialization(e.to_string()))
}

/// Decodes JSON text produced by [`serialize`].
///
/// # Errors
///
/// Returns [`BridgeError::Serialization`] for invalid JSON or a malformed
/// marker payload.
pub fn deserialize(text: &str) -> BridgeResult<Value> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| BridgeError::Serialization(e.to_string()))?;
    from_json(json)
}

/// Flattens an error into a plain object: `message`, `stack` (when present)
/// and every extra property.
#[must_use]
pub fn serialize_error(error: &ErrorObject) -> Value {
    let mut map = error.properties.clone();
    map.insert(MESSAGE_KEY.to_string(), Value::Text(error.message.clone()));
    if let Some(stack) = &error.stack {
        map.insert(STACK_KEY.to_string(), Value::Text(stack.clone()));
    }
    Value::Object(map)
}

/// Rebuilds an error from a plain object produced by [`serialize_error`].
///
/// Every key other than `message` and `stack` is copied back as an extra
/// property. A bare string becomes the message of a new error.
///
/// # Errors
///
/// Returns [`BridgeError::Serialization`] when `value` is neither an object
/// nor a string.
pub fn deserialize_error(value: &Value) -> BridgeResult<ErrorObject> {
    match value {
        Value::Text(message) => Ok(ErrorObject::new(message.clone())),
        Value::Error(error) => Ok(error.clone()),
        Value::Object(map) => {
            let mut properties = map.clone();
            let message = match properties.remove(MESSAGE_KEY) {
                Some(Value::Text(message)) => message,
                Some(other) => other.type_name().to_string(),
                None => String::new(),
            };
            let stack = match properties.remove(STACK_KEY) {
                Some(Value::Text(stack)) => Some(stack),
                _ => None,
            };
            Ok(ErrorObject {
                message,
                stack,
                properties,
            })
        }
        other => Err(BridgeError::Serialization(format!(
            "cannot rebuild an error from {}",
            other.type_name()
        ))),
    }
}

// ── JSON conversion ─────────────────────────────────────────────────────

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Integer(v) => Json::Number(Number::from(*v)),
        Value::Float(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::Text(v) => Json::String(v.clone()),
        Value::Bytes(bytes) => {
            let payload = bytes.iter().map(|b| Json::Number(Number::from(*b))).collect();
            tagged(BYTES_MARKER, Json::Array(payload))
        }
        Value::Error(error) => tagged(ERROR_MARKER, to_json(&serialize_error(error))),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Object(map) => Json::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect(),
        ),
    }
}

fn tagged(marker: &str, payload: Json) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(marker.to_string(), payload);
    Json::Object(map)
}

#[allow(clippy::cast_precision_loss)]
fn from_json(json: Json) -> BridgeResult<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(v) => Value::Bool(v),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Integer(v)
            } else if let Some(v) = n.as_u64() {
                Value::Float(v as f64)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(v) => Value::Text(v),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<BridgeResult<_>>()?,
        ),
        Json::Object(mut map) => {
            if map.len() == 1 {
                if let Some(payload) = map.remove(BYTES_MARKER) {
                    return revive_bytes(payload);
                }
                if let Some(payload) = map.remove(ERROR_MARKER) {
                    return Ok(Value::Error(deserialize_error(&from_json(payload)?)?));
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| Ok((key, from_json(value)?)))
                    .collect::<BridgeResult<BTreeMap<_, _>>>()?,
            )
        }
    })
}

fn revive_bytes(payload: Json) -> BridgeResult<Value> {
    let Json::Array(items) = payload else {
        return Err(BridgeError::Serialization(
            "byte buffer payload is not an array".to_string(),
        ));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| BridgeError::Serialization(format!("invalid byte value {item}")))
        })
        .collect::<BridgeResult<Vec<u8>>>()
        .map(Value::Bytes)
}
