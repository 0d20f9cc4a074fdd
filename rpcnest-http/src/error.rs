use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use rpcnest_core::RpcError;
use serde_json::{json, Map, Value};

/// ISO-8601 timestamp embedded in every response body.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A structured JSON error response: `{error, timestamp, ...}`.
#[derive(Debug, Clone)]
pub struct HttpRpcError {
    pub status: StatusCode,
    pub body: Value,
}

impl HttpRpcError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let body = json!({
            "error": message.into(),
            "timestamp": timestamp(),
        });
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Build the response for a failed call. Lookup misses list the names
    /// that would have resolved.
    pub fn from_rpc(error: &RpcError) -> Self {
        let mut this = Self::new(error.status(), error.to_string()).with("code", error.code());
        if let Some(available) = error.available() {
            this = this.with("available", available.to_vec());
        }
        this
    }

    /// Add a field to the body.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

impl From<RpcError> for HttpRpcError {
    fn from(error: RpcError) -> Self {
        Self::from_rpc(&error)
    }
}

impl IntoResponse for HttpRpcError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl std::fmt::Display for HttpRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.body.get("error").and_then(Value::as_str) {
            Some(message) => write!(f, "{} ({})", message, self.status),
            None => write!(f, "rpc error ({})", self.status),
        }
    }
}

/// Slot value for a failed batch member: `{error: {message, code}}`.
pub fn member_error(error: &RpcError) -> Value {
    let mut inner = Map::new();
    inner.insert("message".into(), error.to_string().into());
    inner.insert("code".into(), error.code().into());
    if let Some(available) = error.available() {
        inner.insert("available".into(), available.to_vec().into());
    }
    json!({ "error": inner })
}
