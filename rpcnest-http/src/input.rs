//! Request input decoding.

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderMap;
use rpcnest_core::{ContentType, RpcError};
use serde_json::{Map, Value};

/// Input used when a request carries none.
pub fn empty_input() -> Value {
    Value::Object(Map::new())
}

/// Decode a POST body according to its `Content-Type`. A missing header
/// means JSON.
pub fn decode_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, RpcError> {
    let mime = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    if mime.trim_start().to_ascii_lowercase().starts_with("multipart/") {
        return Err(RpcError::InvalidInput(
            "multipart bodies are not supported, send application/x-www-form-urlencoded".into(),
        ));
    }

    match ContentType::from_mime(mime).unwrap_or(ContentType::OctetStream) {
        ContentType::Json => decode_json(body),
        ContentType::Text => String::from_utf8(body.to_vec())
            .map(Value::String)
            .map_err(|_| RpcError::InvalidInput("text body is not valid UTF-8".into())),
        ContentType::OctetStream => Ok(Value::Array(
            body.iter().map(|b| Value::from(*b)).collect(),
        )),
        ContentType::FormData => Ok(decode_form(body)),
    }
}

fn decode_json(body: &[u8]) -> Result<Value, RpcError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(empty_input());
    }
    serde_json::from_slice(body)
        .map_err(|e| RpcError::InvalidInput(format!("invalid JSON body: {e}")))
}

/// Repeated keys collect into an array.
fn decode_form(body: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in form_urlencoded::parse(body) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Parse the `input` query parameter. Absent means no input.
pub fn parse_query_input(raw: Option<&str>) -> Result<Value, RpcError> {
    match raw {
        None => Ok(empty_input()),
        Some(raw) if raw.trim().is_empty() => Ok(empty_input()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| RpcError::InvalidInput(format!("invalid JSON in input parameter: {e}"))),
    }
}

/// Strip the `{"json": ...}` envelope batching clients wrap inputs in.
pub fn unwrap_envelope(input: Value) -> Value {
    match input {
        Value::Object(mut map) if map.contains_key("json") => {
            map.remove("json").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Split `router.procedure` on the first dot.
pub fn split_procedure(path: &str) -> Result<(&str, &str), RpcError> {
    match path.split_once('.') {
        Some((router, procedure)) if !router.is_empty() && !procedure.is_empty() => {
            Ok((router, procedure))
        }
        _ => Err(RpcError::InvalidProcedurePath(path.to_string())),
    }
}

pub fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}
