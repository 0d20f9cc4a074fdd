use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, IntoHeaderName, ACCEPT, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tower::util::ServiceExt;

/// In-process HTTP client for an rpcnest application.
///
/// Requests go through `tower::ServiceExt::oneshot`, no port is bound. The
/// procedure helpers prepend the mount prefix (`/trpc` unless changed).
pub struct TestApp {
    router: Router,
    prefix: String,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            prefix: "/trpc".to_string(),
        }
    }

    /// Mount prefix used by the procedure helpers.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = format!("/{}", prefix.trim_matches('/'));
        self
    }

    fn endpoint(&self, rest: &str) -> String {
        let base = self.prefix.trim_end_matches('/');
        if rest.is_empty() {
            if base.is_empty() { "/".to_string() } else { base.to_string() }
        } else {
            format!("{base}/{rest}")
        }
    }

    pub fn get(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::GET, path)
    }

    pub fn post(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::POST, path)
    }

    /// `POST {prefix}/{procedure}` with a JSON input.
    pub fn call(&self, procedure: &str, input: &impl Serialize) -> TestRequest<'_> {
        self.post(&self.endpoint(procedure)).json(input)
    }

    /// `GET {prefix}/{procedure}?input=...`
    pub fn query(&self, procedure: &str, input: &impl Serialize) -> TestRequest<'_> {
        let uri = format!("{}?input={}", self.endpoint(procedure), encode(input));
        self.get(&uri)
    }

    /// `GET {prefix}/{a},{b}?batch=1&input={"0":...}` with one input per procedure.
    pub fn get_batch(&self, calls: &[(&str, Value)]) -> TestRequest<'_> {
        let procedures: Vec<&str> = calls.iter().map(|(p, _)| *p).collect();
        let inputs: Map<String, Value> = calls
            .iter()
            .enumerate()
            .map(|(i, (_, input))| (i.to_string(), input.clone()))
            .collect();
        let uri = format!(
            "{}?batch=1&input={}",
            self.endpoint(&procedures.join(",")),
            encode(&inputs)
        );
        self.get(&uri)
    }

    /// `POST {prefix}` with `{"<id>": {"procedure", "input"}}` built from `calls`.
    pub fn post_batch(&self, calls: &[(&str, &str, Value)]) -> TestRequest<'_> {
        let body: Map<String, Value> = calls
            .iter()
            .map(|(id, procedure, input)| {
                let op = serde_json::json!({ "procedure": procedure, "input": input });
                (id.to_string(), op)
            })
            .collect();
        self.post(&self.endpoint("")).json(&body)
    }

    /// `GET {prefix}`
    pub fn info(&self) -> TestRequest<'_> {
        self.get(&self.endpoint(""))
    }
}

fn encode(value: &impl Serialize) -> String {
    let json = serde_json::to_string(value).expect("input must serialize");
    form_urlencoded::byte_serialize(json.as_bytes()).collect()
}

/// A request under construction.
pub struct TestRequest<'a> {
    app: &'a TestApp,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: Method, path: &str) -> Self {
        Self {
            app,
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl IntoHeaderName, value: impl AsRef<str>) -> Self {
        self.headers
            .insert(name, value.as_ref().parse().expect("invalid header value"));
        self
    }

    /// Ask for an event-stream answer.
    pub fn event_stream(self) -> Self {
        self.header(ACCEPT, "text/event-stream")
    }

    pub fn json(mut self, body: &impl Serialize) -> Self {
        self.body = Some(serde_json::to_vec(body).expect("body must serialize"));
        self.header(CONTENT_TYPE, "application/json")
    }

    /// Raw body with an explicit content type.
    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self.header(CONTENT_TYPE, content_type)
    }

    pub async fn send(self) -> TestResponse {
        let body = self.body.map(Body::from).unwrap_or_else(Body::empty);
        let mut builder = Request::builder().method(self.method).uri(&self.path);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(body).expect("invalid request");

        let response = self
            .app
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("failed to send request");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Resolve a dotted path such as `result.items.0.name` in `root`.
/// Numeric segments index arrays; `len()` yields the length of the
/// collection reached so far. Missing segments resolve to `null`.
pub fn resolve_path(root: &Value, path: &str) -> Value {
    let mut current = root.clone();
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match (segment, &current) {
            ("len()", Value::Array(items)) => Value::from(items.len()),
            ("len()", Value::Object(map)) => Value::from(map.len()),
            ("len()", Value::String(s)) => Value::from(s.len()),
            ("len()", other) => panic!("len() applied to a non-collection: {other}"),
            (segment, Value::Array(items)) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null),
            (segment, value) => value.get(segment).cloned().unwrap_or(Value::Null),
        };
    }
    current
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status,
            expected,
            "Expected {expected}, got {}\nBody: {}",
            self.status,
            self.text()
        );
        self
    }

    /// Assert that a dotted path resolves to `expected`.
    pub fn assert_json_path(self, path: &str, expected: impl Into<Value>) -> Self {
        let root: Value = self.json();
        let actual = resolve_path(&root, path);
        let expected = expected.into();
        assert_eq!(
            actual, expected,
            "JSON path \"{path}\" assertion failed\n  Expected: {expected}\n  Actual:   {actual}\n  Body: {root}",
        );
        self
    }

    pub fn assert_json_path_fn(self, path: &str, predicate: impl FnOnce(&Value) -> bool) -> Self {
        let root: Value = self.json();
        let actual = resolve_path(&root, path);
        assert!(
            predicate(&actual),
            "JSON path \"{path}\" predicate failed\n  Value: {actual}\n  Body: {root}",
        );
        self
    }

    /// Assert the body is an event stream carrying exactly these data payloads.
    pub fn assert_events(self, expected: &[Value]) -> Self {
        assert_eq!(
            self.header("content-type"),
            Some("text/event-stream"),
            "not an event stream\nBody: {}",
            self.text()
        );
        assert_eq!(self.events(), expected, "Body: {}", self.text());
        self
    }

    pub fn json_path<T: DeserializeOwned>(&self, path: &str) -> T {
        let root: Value = self.json();
        let value = resolve_path(&root, path);
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            panic!("Failed to deserialize JSON path \"{path}\": {e}\n  Value: {value}\n  Body: {root}")
        })
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        let name: HeaderName = name.as_ref().parse().ok()?;
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("Failed to parse JSON: {e}\nBody: {}", self.text()))
    }

    /// Data payloads of an event-stream body, heartbeats skipped.
    pub fn events(&self) -> Vec<Value> {
        self.text()
            .split("\n\n")
            .filter_map(|frame| {
                frame
                    .lines()
                    .find_map(|line| line.strip_prefix("data: "))
                    .map(|data| serde_json::from_str(data).unwrap_or(Value::String(data.into())))
            })
            .collect()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}
