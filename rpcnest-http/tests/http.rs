use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use rpcnest_core::prelude::*;
use rpcnest_core::{stream_handler, typed_handler, DiscoveryOptions};
use rpcnest_http::{RouterIntrospector, RpcHttp};
use serde::Deserialize;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Deserialize)]
struct ById {
    id: u64,
}

struct WidgetsController;

impl RpcController for WidgetsController {
    fn declaration() -> ControllerDecl<Self> {
        ControllerDecl::new("WidgetsController")
            .query("get", |_c: Arc<Self>, input: ById| async move {
                Ok::<_, RpcError>(json!({"id": input.id, "name": format!("w{}", input.id)}))
            })
            .mutation("fail", |_c: Arc<Self>, _: Value| async {
                Err::<Value, _>(RpcError::forbidden("denied"))
            })
            .procedure(
                ProcedureMeta::mutation("rename").with_content_type(ContentType::Text),
                typed_handler(|_c: Arc<Self>, name: String| async move {
                    Ok::<_, RpcError>(name)
                }),
            )
            .streaming_query("numbers", |_c: Arc<Self>, _: Value| async {
                Sequence::from_items(vec![1, 2])
            })
            .procedure(
                ProcedureMeta::subscription("ticks").sse(),
                stream_handler(|_c: Arc<Self>, _: Value| async {
                    Sequence::from_items(vec![1, 2, 3])
                }),
            )
    }
}

/// `ticks` emits once and then never completes.
struct ClockController;

impl RpcController for ClockController {
    fn declaration() -> ControllerDecl<Self> {
        ControllerDecl::new("ClockController")
            .query("now", |_c: Arc<Self>, _: Value| async { Ok::<_, RpcError>(1) })
            .subscription("ticks", |_c: Arc<Self>, _: Value| async {
                Sequence::new(futures_util::stream::iter([0u64]).chain(futures_util::stream::pending()))
            })
    }
}

struct Broken;

impl RouterIntrospector for Broken {
    fn procedures(&self, _service: &AutoRouter) -> Result<Vec<String>, RpcError> {
        Err(RpcError::internal("router internals unavailable"))
    }
}

fn service() -> Arc<AutoRouter> {
    let registry = ControllerRegistry::new();
    registry.declare::<WidgetsController>().unwrap();
    registry.bind(Arc::new(WidgetsController)).unwrap();
    let service = Arc::new(AutoRouter::new(
        registry,
        DiscoveryOptions {
            auto_discovery: true,
            unbound: UnboundPolicy::Fail,
        },
    ));
    assert_eq!(service.perform_auto_discovery(), 1);
    service
}

fn app() -> axum::Router {
    RpcHttp::new(service()).routes()
}

fn clock_app() -> axum::Router {
    let registry = ControllerRegistry::new();
    registry.declare::<ClockController>().unwrap();
    registry.bind(Arc::new(ClockController)).unwrap();
    let service = Arc::new(AutoRouter::new(
        registry,
        DiscoveryOptions {
            auto_discovery: true,
            unbound: UnboundPolicy::Fail,
        },
    ));
    service.perform_auto_discovery();
    RpcHttp::new(service).routes()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn send_json(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn encode(input: &Value) -> String {
    form_urlencoded::byte_serialize(input.to_string().as_bytes()).collect()
}

#[tokio::test]
async fn post_single_returns_the_call_envelope() {
    let (status, body) = send_json(app(), post("/trpc/widgets.get", json!({"id": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["procedure"], "widgets.get");
    assert_eq!(body["input"], json!({"id": 1}));
    assert_eq!(body["result"], json!({"id": 1, "name": "w1"}));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn procedure_path_without_a_dot_is_rejected() {
    let (status, body) = send_json(app(), post("/trpc/widgets", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("routerName.procedureName"));
}

#[tokio::test]
async fn unknown_router_is_not_found_with_alternatives() {
    let (status, body) = send_json(app(), post("/trpc/gizmos.get", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["available"], json!(["widgets"]));
    assert_eq!(body["procedure"], "gizmos.get");
}

#[tokio::test]
async fn handler_errors_keep_their_status() {
    let (status, body) = send_json(app(), post("/trpc/widgets.fail", json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "error calling widgets.fail: denied");
}

#[tokio::test]
async fn get_single_decodes_the_input_parameter() {
    let uri = format!("/trpc/widgets.get?input={}", encode(&json!({"id": 4})));
    let (status, body) = send_json(app(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["name"], "w4");
}

#[tokio::test]
async fn malformed_query_input_is_a_bad_request() {
    let (status, body) = send_json(app(), get("/trpc/widgets.get?input=not-json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn get_batch_unwraps_the_json_envelope() {
    let input = json!({"0": {"json": {"id": 1}}});
    let uri = format!("/trpc/widgets.get?batch=1&input={}", encode(&input));
    let (status, body) = send_json(app(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"], json!({"id": 1, "name": "w1"}));
}

#[tokio::test]
async fn get_batch_isolates_failures_per_index() {
    let input = json!({"0": {"id": 2}, "1": {}});
    let uri = format!("/trpc/widgets.get,widgets.fail?batch=1&input={}", encode(&input));
    let (status, body) = send_json(app(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"]["id"], 2);
    assert_eq!(body["1"]["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn post_batch_reports_each_key() {
    let batch = json!({
        "0": {"procedure": "widgets.get", "input": {"id": 3}},
        "1": {"procedure": "nowhere.get", "input": {}},
    });
    let (status, body) = send_json(app(), post("/trpc", batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"]["name"], "w3");
    assert!(body["0"]["timestamp"].is_string());
    assert_eq!(body["1"]["error"]["code"], "NOT_FOUND");
    assert!(body["1"]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Router 'nowhere' not found"));

    let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["0", "1"]);
}

#[tokio::test]
async fn post_batch_member_without_procedure_fails_alone() {
    let batch = json!({
        "a": {"input": {}},
        "b": {"procedure": "widgets.get", "input": {"id": 9}},
    });
    let (status, body) = send_json(app(), post("/trpc", batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["a"]["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["b"]["result"]["id"], 9);
}

#[tokio::test]
async fn post_batch_requires_an_object() {
    let (status, body) = send_json(app(), post("/trpc", json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn text_bodies_reach_text_mutations() {
    let request = Request::post("/trpc/widgets.rename")
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, body) = send_json(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "hello");
}

#[tokio::test]
async fn sequences_collect_into_arrays_without_sse() {
    let (status, body) = send_json(app(), get("/trpc/widgets.numbers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!([1, 2]));
}

#[tokio::test]
async fn sse_procedures_answer_with_an_event_stream() {
    let (status, headers, body) = send(app(), get("/trpc/widgets.ticks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(!headers.contains_key("connection"));
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        "data: 1\n\ndata: 2\n\ndata: 3\n\n"
    );
}

#[tokio::test]
async fn accept_header_selects_sse_for_streaming_queries() {
    let request = Request::get("/trpc/widgets.numbers")
        .header("accept", "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let (_, headers, body) = send(app(), request).await;
    assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
    assert_eq!(std::str::from_utf8(&body).unwrap(), "data: 1\n\ndata: 2\n\n");
}

#[tokio::test]
async fn info_lists_introspected_procedures() {
    let (status, body) = send_json(app(), get("/trpc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routerInfo"]["introspection"], "router");
    assert_eq!(body["routerInfo"]["totalProcedures"], 5);
    assert!(body["availableProcedures"]
        .as_array()
        .unwrap()
        .contains(&json!("widgets.get")));
    assert_eq!(body["registeredControllers"][0]["className"], "WidgetsController");
    assert_eq!(
        body["routerInfo"]["proceduresByRouter"]["widgets"],
        json!(["fail", "get", "numbers", "rename", "ticks"])
    );
}

#[tokio::test]
async fn info_falls_back_to_static_hints() {
    let app = RpcHttp::new(service()).introspector(Arc::new(Broken)).routes();
    let (status, body) = send_json(app, get("/trpc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routerInfo"]["introspection"], "fallback");
    let procedures = body["availableProcedures"].as_array().unwrap();
    assert!(!procedures.is_empty());
    assert!(procedures.contains(&json!("widgets.getAll")));
    assert!(procedures.contains(&json!("widgets.delete")));
}

#[tokio::test]
async fn custom_prefix_moves_every_endpoint() {
    let app = RpcHttp::new(service()).prefix("api/rpc/").routes();
    let (status, _) = send_json(app.clone(), post("/api/rpc/widgets.get", json!({"id": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(app.clone(), get("/api/rpc")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(app, get("/trpc")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_query_string_gets_a_structured_error() {
    let (status, body) = send_json(app(), get("/trpc/widgets.get?input=%FF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn get_batch_trims_procedure_names() {
    let input = json!({"0": {"id": 1}, "1": {"id": 2}});
    let uri = format!(
        "/trpc/widgets.get,%20widgets.get?batch=1&input={}",
        encode(&input)
    );
    let (status, body) = send_json(app(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"]["id"], 1);
    assert_eq!(body["1"]["result"]["id"], 2);
}

#[tokio::test]
async fn batches_refuse_subscriptions_without_waiting_on_them() {
    let batch = json!({
        "0": {"procedure": "clock.now", "input": {}},
        "1": {"procedure": "clock.ticks", "input": {}},
    });
    let (status, body) = tokio::time::timeout(
        Duration::from_secs(2),
        send_json(clock_app(), post("/trpc", batch)),
    )
    .await
    .expect("batch waited on a subscription");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"], 1);
    assert_eq!(body["1"]["error"]["code"], "BAD_REQUEST");

    let (status, body) = tokio::time::timeout(
        Duration::from_secs(2),
        send_json(clock_app(), get("/trpc/clock.now,clock.ticks?batch=1")),
    )
    .await
    .expect("batch waited on a subscription");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["0"]["result"], 1);
    assert_eq!(body["1"]["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn single_subscription_calls_stream_without_accept_header() {
    let request = Request::post("/trpc/clock.ticks")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), async {
        let response = clock_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        let mut body = response.into_body();
        body.frame().await.unwrap().unwrap().into_data().unwrap()
    })
    .await
    .expect("subscription response was not streamed");
    assert_eq!(std::str::from_utf8(&first).unwrap(), "data: 0\n\n");
}
