//! Light coercion of mutation inputs declared with a non-JSON content type.

use base64::Engine;
use serde_json::{Map, Value};

use crate::error::RpcError;
use crate::meta::ContentType;

/// Coerce `input` to the shape the declared content type promises.
///
/// - `text`: scalars become strings; objects and arrays are rejected.
/// - `octet-stream`: a base64 string is decoded into a byte array; an array
///   must already hold values in `0..=255`.
/// - `formdata`: an object whose values are scalars (stringified) or arrays
///   of scalars.
/// - `json`: unchanged.
pub fn coerce_input(content_type: ContentType, input: Value) -> Result<Value, RpcError> {
    match content_type {
        ContentType::Json => Ok(input),
        ContentType::Text => coerce_text(input),
        ContentType::OctetStream => coerce_bytes(input),
        ContentType::FormData => coerce_form(input),
    }
}

fn coerce_text(input: Value) -> Result<Value, RpcError> {
    scalar_to_string(input)
        .map(Value::String)
        .ok_or_else(|| RpcError::InvalidInput("text input must be a string".into()))
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn coerce_bytes(input: Value) -> Result<Value, RpcError> {
    match input {
        Value::String(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    RpcError::InvalidInput(format!("binary input is not valid base64: {e}"))
                })?;
            Ok(Value::Array(bytes.into_iter().map(Value::from).collect()))
        }
        Value::Array(items) => {
            let in_range = items
                .iter()
                .all(|item| item.as_u64().is_some_and(|b| b <= u8::MAX as u64));
            if in_range {
                Ok(Value::Array(items))
            } else {
                Err(RpcError::InvalidInput(
                    "binary input must be an array of bytes (0-255)".into(),
                ))
            }
        }
        _ => Err(RpcError::InvalidInput(
            "binary input must be a base64 string or a byte array".into(),
        )),
    }
}

fn coerce_form(input: Value) -> Result<Value, RpcError> {
    let Value::Object(fields) = input else {
        return Err(RpcError::InvalidInput("form data input must be an object".into()));
    };
    let mut out = Map::with_capacity(fields.len());
    for (key, value) in fields {
        let coerced = match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| form_scalar(&key, item))
                    .collect::<Result<_, _>>()?,
            ),
            scalar => form_scalar(&key, scalar)?,
        };
        out.insert(key, coerced);
    }
    Ok(Value::Object(out))
}

fn form_scalar(key: &str, value: Value) -> Result<Value, RpcError> {
    scalar_to_string(value).map(Value::String).ok_or_else(|| {
        RpcError::InvalidInput(format!("form field '{key}' must be a scalar or a list"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_passes_through() {
        let v = json!({"nested": {"a": [1, 2]}});
        assert_eq!(coerce_input(ContentType::Json, v.clone()).unwrap(), v);
    }

    #[test]
    fn text_stringifies_scalars() {
        assert_eq!(coerce_input(ContentType::Text, json!(42)).unwrap(), json!("42"));
        assert_eq!(coerce_input(ContentType::Text, json!("hi")).unwrap(), json!("hi"));
        assert!(coerce_input(ContentType::Text, json!({"a": 1})).is_err());
    }

    #[test]
    fn octet_stream_decodes_base64() {
        let out = coerce_input(ContentType::OctetStream, json!("AQID")).unwrap();
        assert_eq!(out, json!([1, 2, 3]));
    }

    #[test]
    fn octet_stream_rejects_out_of_range_bytes() {
        assert!(coerce_input(ContentType::OctetStream, json!([1, 256])).is_err());
        assert!(coerce_input(ContentType::OctetStream, json!([0, 255])).is_ok());
    }

    #[test]
    fn form_data_stringifies_fields() {
        let out = coerce_input(ContentType::FormData, json!({"age": 3, "tags": ["a", 1]})).unwrap();
        assert_eq!(out, json!({"age": "3", "tags": ["a", "1"]}));
        assert!(coerce_input(ContentType::FormData, json!({"deep": {"x": 1}})).is_err());
        assert!(coerce_input(ContentType::FormData, json!("flat")).is_err());
    }
}
