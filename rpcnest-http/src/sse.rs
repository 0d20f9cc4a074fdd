//! Server-sent event responses for streaming procedures.

use std::time::Duration;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_TYPE,
};
use http::{HeaderMap, StatusCode};
use rpcnest_core::stream::sse_frames;
use rpcnest_core::ValueStream;

#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Zero disables heartbeats.
    pub heartbeat: Duration,
    /// Extra headers, applied after the defaults.
    pub headers: HeaderMap,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            headers: HeaderMap::new(),
        }
    }
}

impl SseOptions {
    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Stream `values` as an event-stream response.
pub fn sse_response(values: ValueStream, options: SseOptions) -> Response {
    let body = Body::from_stream(sse_frames(values, options.heartbeat));
    let mut response = (StatusCode::OK, body).into_response();

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Cache-Control"),
    );
    for (name, value) in &options.headers {
        headers.insert(name.clone(), value.clone());
    }
    response
}
