//! Mapping between plain JSON and Firestore's typed value encoding.
//!
//! The REST API wraps every field in a type tag (`stringValue`,
//! `integerValue`, `mapValue`, ...). Models are serialized to
//! `serde_json::Value` first and converted here, so the adapter never hand
//! -builds per-entity wire shapes.

use serde_json::{Map, Value, json};

use crate::error::StoreError;

/// Encode a JSON value as a Firestore value.
pub fn to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // Firestore integers are transported as strings.
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a JSON object as a Firestore document `fields` map.
pub fn encode_fields(map: &Map<String, Value>) -> Value {
    let mut fields = Map::new();
    for (key, value) in map {
        fields.insert(key.clone(), to_firestore(value));
    }
    Value::Object(fields)
}

/// Decode a Firestore value back to plain JSON.
pub fn from_firestore(value: &Value) -> Result<Value, StoreError> {
    let Some(map) = value.as_object() else {
        return Err(StoreError::Http(format!(
            "malformed firestore value: {value}"
        )));
    };
    if let Some((tag, inner)) = map.iter().next() {
        match tag.as_str() {
            "nullValue" => Ok(Value::Null),
            "booleanValue" => Ok(inner.clone()),
            "stringValue" => Ok(inner.clone()),
            "timestampValue" => Ok(inner.clone()),
            "integerValue" => {
                let raw = inner.as_str().unwrap_or_default();
                let n: i64 = raw.parse().map_err(|_| {
                    StoreError::Http(format!("malformed firestore integer: {inner}"))
                })?;
                Ok(json!(n))
            }
            "doubleValue" => Ok(inner.clone()),
            "arrayValue" => {
                let values = inner
                    .get("values")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut items = Vec::with_capacity(values.len());
                for v in &values {
                    items.push(from_firestore(v)?);
                }
                Ok(Value::Array(items))
            }
            "mapValue" => {
                let fields = inner
                    .get("fields")
                    .and_then(|f| f.as_object())
                    .cloned()
                    .unwrap_or_default();
                decode_fields(&fields)
            }
            other => Err(StoreError::Http(format!(
                "unsupported firestore value tag: {other}"
            ))),
        }
    } else {
        Err(StoreError::Http("empty firestore value".to_string()))
    }
}

/// Decode a document `fields` map back to a JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value, StoreError> {
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), from_firestore(value)?);
    }
    Ok(Value::Object(out))
}
