use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::StatusCode;
use rpcnest_core::prelude::*;
use rpcnest_core::{global, router_name, typed_handler, DiscoveryOptions, Phase};
use serde_json::{json, Value};
use serial_test::serial;

#[derive(Default)]
struct WidgetsController {
    calls: AtomicUsize,
}

impl WidgetsController {
    async fn echo(&self, input: Value) -> Result<Value, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input)
    }

    async fn fail(&self) -> Result<Value, RpcError> {
        Err(RpcError::forbidden("boom"))
    }
}

impl RpcController for WidgetsController {
    fn declaration() -> ControllerDecl<Self> {
        ControllerDecl::new("WidgetsController")
            .query("echo", |c: Arc<Self>, input: Value| async move { c.echo(input).await })
            .mutation("fail", |c: Arc<Self>, _: ()| async move { c.fail().await })
            .default_instance()
    }
}

struct GadgetController;

impl RpcController for GadgetController {
    fn declaration() -> ControllerDecl<Self> {
        ControllerDecl::new("GadgetController")
            .prefix("things")
            .query("list", |_c: Arc<Self>, _: ()| async {
                Ok::<_, RpcError>(vec![1, 2, 3])
            })
    }
}

struct DuplicatedController;

impl RpcController for DuplicatedController {
    fn declaration() -> ControllerDecl<Self> {
        ControllerDecl::new("DuplicatedController")
            .prefix("dup")
            .procedure(
                ProcedureMeta::query("first").with_path("same"),
                typed_handler(|_c: Arc<Self>, _: ()| async { Ok::<_, RpcError>(1) }),
            )
            .procedure(
                ProcedureMeta::query("second").with_path("same"),
                typed_handler(|_c: Arc<Self>, _: ()| async { Ok::<_, RpcError>(2) }),
            )
    }
}

fn options(unbound: UnboundPolicy) -> DiscoveryOptions {
    DiscoveryOptions {
        auto_discovery: true,
        unbound,
    }
}

fn bound_widgets() -> (Arc<WidgetsController>, AutoRouter) {
    let registry = ControllerRegistry::new();
    registry.declare::<WidgetsController>().unwrap();
    let instance = Arc::new(WidgetsController::default());
    registry.bind(instance.clone()).unwrap();
    let auto = AutoRouter::new(registry, options(UnboundPolicy::Fail));
    assert_eq!(auto.perform_auto_discovery(), 1);
    (instance, auto)
}

#[test]
fn router_names_derive_from_class_names() {
    assert_eq!(router_name("WidgetsController", ""), "widgets");
    assert_eq!(router_name("Widgets", ""), "widgets");
    assert_eq!(router_name("UserProfileController", ""), "userProfile");
    assert_eq!(router_name("WidgetsController", "custom"), "custom");
}

#[tokio::test]
async fn call_procedure_invokes_the_bound_instance() {
    let (instance, auto) = bound_widgets();
    let out = auto
        .call_procedure("widgets", "echo", json!({"id": 7}))
        .await
        .unwrap();
    assert_eq!(out.collect().await.unwrap(), json!({"id": 7}));
    assert_eq!(instance.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn discovery_is_idempotent() {
    let (_, auto) = bound_widgets();
    assert_eq!(auto.perform_auto_discovery(), 0);
    assert_eq!(auto.registered_controllers().len(), 1);
    assert_eq!(auto.router_names(), vec!["widgets"]);
}

#[tokio::test]
async fn unknown_router_lists_available_routers() {
    let (_, auto) = bound_widgets();
    let err = auto
        .call_procedure("nope", "echo", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.available(), Some(&["widgets".to_string()][..]));
}

#[tokio::test]
async fn unknown_procedure_lists_available_procedures() {
    let (_, auto) = bound_widgets();
    let err = auto
        .call_procedure("widgets", "nope", json!({}))
        .await
        .unwrap_err();
    match err {
        RpcError::ProcedureNotFound { available, .. } => {
            assert_eq!(available, vec!["echo", "fail"])
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn handler_errors_are_wrapped_with_context() {
    let (_, auto) = bound_widgets();
    let err = auto
        .call_procedure("widgets", "fail", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "error calling widgets.fail: boom");
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(err.code(), "FORBIDDEN");
}

#[test]
fn unbound_controllers_are_skipped_by_default() {
    let registry = ControllerRegistry::new();
    registry.declare::<WidgetsController>().unwrap();
    let auto = AutoRouter::new(registry, options(UnboundPolicy::Fail));
    assert_eq!(auto.perform_auto_discovery(), 0);
    assert!(auto.router_names().is_empty());
}

#[test]
fn default_construct_needs_an_opt_in_factory() {
    let registry = ControllerRegistry::new();
    registry.declare::<WidgetsController>().unwrap();
    registry.declare::<GadgetController>().unwrap();
    let auto = AutoRouter::new(registry, options(UnboundPolicy::DefaultConstruct));
    assert_eq!(auto.perform_auto_discovery(), 1);
    assert_eq!(auto.router_names(), vec!["widgets"]);
}

#[test]
fn manual_registration_rebuilds_the_main_router() {
    let (_, auto) = bound_widgets();
    assert!(!auto
        .get_main_router()
        .procedure_paths()
        .contains(&"things.list".to_string()));

    auto.register_controller(Arc::new(GadgetController)).unwrap();

    let paths = auto.get_main_router().procedure_paths();
    assert_eq!(paths, vec!["things.list", "widgets.echo", "widgets.fail"]);
    let info = auto.registered_controllers();
    assert_eq!(info[0].name, "things");
    assert_eq!(info[0].class_name, "GadgetController");
    assert_eq!(info[0].prefix, "things");
}

#[tokio::test]
async fn controllers_whose_router_fails_are_left_out() {
    let registry = ControllerRegistry::new();
    registry.declare::<DuplicatedController>().unwrap();
    registry.declare::<GadgetController>().unwrap();
    registry.bind(Arc::new(DuplicatedController)).unwrap();
    registry.bind(Arc::new(GadgetController)).unwrap();
    let auto = AutoRouter::new(registry, options(UnboundPolicy::Fail));

    assert_eq!(auto.perform_auto_discovery(), 1);
    assert_eq!(auto.router_names(), vec!["things"]);
    assert_eq!(auto.get_main_router().procedure_paths(), vec!["things.list"]);

    let out = auto.call_procedure("things", "list", json!({})).await.unwrap();
    assert_eq!(out.collect().await.unwrap(), json!([1, 2, 3]));
    let err = auto
        .call_procedure("dup", "same", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::RouterNotFound { .. }));
}

#[test]
fn manual_registration_rejects_a_broken_router() {
    let (_, auto) = bound_widgets();
    let err = auto
        .register_controller(Arc::new(DuplicatedController))
        .unwrap_err();
    assert!(matches!(err, RpcError::Declaration(_)));
    assert_eq!(auto.router_names(), vec!["widgets"]);
}

#[test]
fn procedure_meta_reflects_the_declaration() {
    let (_, auto) = bound_widgets();
    let meta = auto.procedure_meta("widgets", "fail").unwrap();
    assert_eq!(meta.kind, ProcedureKind::Mutation);
    assert!(auto.procedure_meta("widgets", "missing").is_none());
}

#[tokio::test]
#[serial]
async fn lifecycle_publishes_the_global_resolver() {
    global::clear_auto_router();
    assert!(matches!(global::main_router(), Err(RpcError::NotInitialized)));

    let registry = ControllerRegistry::new();
    registry.declare::<GadgetController>().unwrap();
    registry.bind(Arc::new(GadgetController)).unwrap();
    let auto = Arc::new(AutoRouter::new(registry, DiscoveryOptions::default()));
    assert_eq!(auto.phase(), Phase::Uninitialized);

    auto.on_module_init();
    assert_eq!(auto.phase(), Phase::Built);
    assert!(global::main_router().unwrap().is_empty());

    auto.on_application_bootstrap();
    assert!(global::registered_controllers().unwrap().is_empty());

    auto.enable_auto_discovery();
    auto.on_application_bootstrap();
    assert_eq!(global::registered_controllers().unwrap().len(), 1);
    let out = global::main_router()
        .unwrap()
        .call("things.list", json!({}))
        .await
        .unwrap();
    assert_eq!(out.collect().await.unwrap(), json!([1, 2, 3]));

    global::clear_auto_router();
}
