use std::sync::Arc;

use garde::Validate;
use rpcnest::config::RpcConfig;
use rpcnest::prelude::*;
use rpcnest_test::TestApp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone)]
struct AppState {
    greeting: String,
}

pub struct UsersController {
    greeting: String,
}

impl StatefulConstruct<AppState> for UsersController {
    fn from_state(state: &AppState) -> Self {
        Self {
            greeting: state.greeting.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct CreateUser {
    #[garde(length(min = 2))]
    name: String,
}

#[rpc_router]
impl UsersController {
    #[query("getById")]
    async fn get_by_id(&self, id: u64) -> Result<Value, RpcError> {
        Ok(json!({ "id": id, "greeting": self.greeting }))
    }

    #[mutation(input = CreateUser)]
    async fn create(&self, input: CreateUser) -> Result<Value, RpcError> {
        Ok(json!({ "created": input.name }))
    }

    #[query]
    fn ping(&self) -> Result<&'static str, RpcError> {
        Ok(if self.secret() == 42 { "pong" } else { "?" })
    }

    #[subscription(sse)]
    async fn countdown(&self, from: u32) -> Sequence<u32> {
        Sequence::from_items((0..=from).rev().collect::<Vec<_>>())
    }

    fn secret(&self) -> u8 {
        42
    }
}

#[derive(Default)]
pub struct StatusController;

#[rpc_router(prefix = "health", default_instance)]
impl StatusController {
    #[query]
    async fn check(&self) -> Result<&'static str, RpcError> {
        Ok("ok")
    }
}

struct Broken;

impl RouterIntrospector for Broken {
    fn procedures(&self, _service: &AutoRouter) -> Result<Vec<String>, RpcError> {
        Err(RpcError::internal("introspection disabled"))
    }
}

fn state() -> AppState {
    AppState {
        greeting: "hello".into(),
    }
}

fn users_app() -> TestApp {
    let runtime = RpcApp::new()
        .with_state(state())
        .auto_discovery(true)
        .bind::<UsersController>()
        .build()
        .unwrap();
    TestApp::new(runtime.into_router())
}

#[tokio::test]
async fn annotated_procedure_receives_its_input() {
    users_app()
        .call("users.getById", &7)
        .send()
        .await
        .assert_ok()
        .assert_json_path("result.id", 7)
        .assert_json_path("result.greeting", "hello")
        .assert_json_path("procedure", "users.getById");
}

#[tokio::test]
async fn input_schema_runs_garde_rules() {
    let app = users_app();
    app.call("users.create", &json!({"name": "x"}))
        .send()
        .await
        .assert_bad_request();
    app.call("users.create", &json!({"name": "ada"}))
        .send()
        .await
        .assert_ok()
        .assert_json_path("result.created", "ada");
}

#[tokio::test]
async fn sync_methods_are_procedures_too() {
    users_app()
        .query("users.ping", &json!({}))
        .send()
        .await
        .assert_ok()
        .assert_json_path("result", "pong");
}

#[tokio::test]
async fn unannotated_methods_are_not_exposed() {
    users_app()
        .call("users.secret", &json!({}))
        .send()
        .await
        .assert_not_found()
        .assert_json_path("available", json!(["countdown", "create", "getById", "ping"]));
}

#[tokio::test]
async fn sse_subscription_streams_events() {
    users_app()
        .query("users.countdown", &2)
        .send()
        .await
        .assert_ok()
        .assert_events(&[json!(2), json!(1), json!(0)]);
}

#[tokio::test]
async fn post_batch_isolates_a_missing_router() {
    users_app()
        .post_batch(&[
            ("0", "users.getById", json!(1)),
            ("1", "ghosts.getById", json!(1)),
        ])
        .send()
        .await
        .assert_ok()
        .assert_json_path("0.result.id", 1)
        .assert_json_path("1.error.code", "NOT_FOUND")
        .assert_json_path_fn("1.error.message", |m| {
            m.as_str().is_some_and(|m| m.contains("users"))
        });
}

#[tokio::test]
async fn get_batch_unwraps_envelopes() {
    users_app()
        .get_batch(&[
            ("users.getById", json!({"json": 5})),
            ("users.ping", json!({})),
        ])
        .send()
        .await
        .assert_ok()
        .assert_json_path("0.result.id", 5)
        .assert_json_path("1.result", "pong");
}

#[tokio::test]
async fn malformed_query_input_is_a_bad_request() {
    users_app()
        .get("/trpc/users.getById?input=not-json")
        .send()
        .await
        .assert_bad_request()
        .assert_json_path_fn("timestamp", Value::is_string);
}

#[tokio::test]
async fn unbound_controllers_need_an_explicit_policy() {
    let app = TestApp::new(users_app_router(UnboundPolicy::Fail));
    app.call("health.check", &json!({}))
        .send()
        .await
        .assert_not_found();

    let app = TestApp::new(users_app_router(UnboundPolicy::DefaultConstruct));
    app.call("health.check", &json!({}))
        .send()
        .await
        .assert_ok()
        .assert_json_path("result", "ok");
}

fn users_app_router(policy: UnboundPolicy) -> axum::Router {
    RpcApp::new()
        .with_state(state())
        .auto_discovery(true)
        .unbound_policy(policy)
        .bind::<UsersController>()
        .build()
        .unwrap()
        .into_router()
}

#[tokio::test]
async fn manual_registration_works_without_discovery() {
    let runtime = RpcApp::new()
        .with_state(state())
        .register::<UsersController>()
        .build()
        .unwrap();
    let names: Vec<String> = runtime
        .service()
        .registered_controllers()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["users"]);

    TestApp::new(runtime.into_router())
        .call("users.getById", &3)
        .send()
        .await
        .assert_ok();
}

#[tokio::test]
async fn instances_can_be_registered_directly() {
    let runtime = RpcApp::new()
        .register_instance(Arc::new(StatusController))
        .build()
        .unwrap();
    TestApp::new(runtime.into_router())
        .call("health.check", &json!({}))
        .send()
        .await
        .assert_ok();
}

#[tokio::test]
async fn info_uses_the_static_fallback_when_introspection_fails() {
    let runtime = RpcApp::new()
        .with_state(state())
        .auto_discovery(true)
        .bind::<UsersController>()
        .with_introspector(Arc::new(Broken))
        .build()
        .unwrap();
    TestApp::new(runtime.into_router())
        .info()
        .send()
        .await
        .assert_ok()
        .assert_json_path("routerInfo.introspection", "fallback")
        .assert_json_path_fn("availableProcedures", |p| {
            p.as_array()
                .is_some_and(|p| p.contains(&json!("users.getAll")) && p.contains(&json!("users.search")))
        });
}

#[tokio::test]
async fn http_endpoints_can_be_disabled() {
    let runtime = RpcApp::new()
        .with_state(state())
        .http_endpoints(false)
        .bind::<UsersController>()
        .build()
        .unwrap();
    TestApp::new(runtime.into_router())
        .info()
        .send()
        .await
        .assert_not_found();
}

#[tokio::test]
async fn settings_come_from_configuration() {
    let config = RpcConfig::from_yaml_str(
        "rpc:\n  auto-discovery: true\n  http:\n    prefix: /api\n",
        "test",
    )
    .unwrap();
    let runtime = RpcApp::new()
        .with_state(state())
        .with_config(&config)
        .unwrap()
        .bind::<UsersController>()
        .build()
        .unwrap();
    assert_eq!(runtime.settings().http_prefix, "/api");

    TestApp::new(runtime.into_router())
        .with_prefix("/api")
        .call("users.getById", &9)
        .send()
        .await
        .assert_ok()
        .assert_json_path("result.id", 9);
}

#[tokio::test]
async fn extra_routes_are_merged() {
    let extra = axum::Router::new().route("/health", axum::routing::get(|| async { "up" }));
    let runtime = RpcApp::new().merge_router(extra).build().unwrap();
    let response = TestApp::new(runtime.into_router()).get("/health").send().await;
    assert_eq!(response.assert_ok().text(), "up");
}
