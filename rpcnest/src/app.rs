use std::sync::Arc;

use rpcnest_core::config::{ConfigError, RpcConfig};
use rpcnest_core::{
    global, AutoRouter, ControllerClass, ControllerRegistry, RpcController, RpcError, RpcSettings,
    StatefulConstruct, UnboundPolicy,
};
use rpcnest_http::{RouterIntrospector, RpcHttp};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

type Binding<S> = Box<dyn FnOnce(&S, &ControllerRegistry) -> Result<(), RpcError> + Send>;
type Registration<S> = Box<dyn FnOnce(&S, &AutoRouter) -> Result<(), RpcError> + Send>;

/// Application builder.
///
/// Owns the application state, constructs controllers from it and drives the
/// aggregation service through its two lifecycle hooks: module init when
/// [`build`](Self::build) starts, application bootstrap once every
/// controller is bound.
pub struct RpcApp<S = ()> {
    state: S,
    registry: ControllerRegistry,
    settings: RpcSettings,
    bindings: Vec<Binding<S>>,
    registrations: Vec<Registration<S>>,
    introspector: Option<Arc<dyn RouterIntrospector>>,
    routes: Vec<axum::Router>,
}

impl RpcApp<()> {
    /// A builder over every controller annotated with `#[rpc_router]` in
    /// the binary.
    pub fn new() -> Self {
        Self {
            state: (),
            registry: ControllerRegistry::from_inventory(),
            settings: RpcSettings::default(),
            bindings: Vec::new(),
            registrations: Vec::new(),
            introspector: None,
            routes: Vec::new(),
        }
    }

    /// Set the state controllers are constructed from.
    pub fn with_state<S: Send + Sync + 'static>(self, state: S) -> RpcApp<S> {
        let bindings = self
            .bindings
            .into_iter()
            .map(|bind| -> Binding<S> {
                Box::new(move |_: &S, registry: &ControllerRegistry| bind(&(), registry))
            })
            .collect();
        let registrations = self
            .registrations
            .into_iter()
            .map(|register| -> Registration<S> {
                Box::new(move |_: &S, service: &AutoRouter| register(&(), service))
            })
            .collect();
        RpcApp {
            state,
            registry: self.registry,
            settings: self.settings,
            bindings,
            registrations,
            introspector: self.introspector,
            routes: self.routes,
        }
    }
}

impl Default for RpcApp<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> RpcApp<S> {
    /// Replace the controller registry, e.g. with one built by hand in tests.
    pub fn with_registry(mut self, registry: ControllerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Read settings from the `rpc.*` keys of `config`.
    pub fn with_config(mut self, config: &RpcConfig) -> Result<Self, ConfigError> {
        self.settings = RpcSettings::from_config(config)?;
        Ok(self)
    }

    pub fn with_settings(mut self, settings: RpcSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    pub fn auto_discovery(mut self, enabled: bool) -> Self {
        self.settings.auto_discovery = enabled;
        self
    }

    pub fn http_endpoints(mut self, enabled: bool) -> Self {
        self.settings.http_enabled = enabled;
        self
    }

    pub fn http_prefix(mut self, prefix: &str) -> Self {
        self.settings.http_prefix = rpcnest_core::settings::normalize_prefix(prefix);
        self
    }

    pub fn unbound_policy(mut self, policy: UnboundPolicy) -> Self {
        self.settings.unbound = policy;
        self
    }

    /// Construct `C` from the state and bind it in the registry, so
    /// discovery serves this instance.
    pub fn bind<C>(mut self) -> Self
    where
        C: RpcController + StatefulConstruct<S>,
    {
        self.bindings.push(Box::new(|state: &S, registry: &ControllerRegistry| {
            if !registry.is_declared(&ControllerClass::of::<C>()) {
                registry.declare::<C>()?;
            }
            registry.bind(Arc::new(C::from_state(state)))
        }));
        self
    }

    /// Bind an already constructed controller.
    pub fn bind_instance<C: RpcController>(mut self, instance: Arc<C>) -> Self {
        self.bindings.push(Box::new(move |_: &S, registry: &ControllerRegistry| {
            if !registry.is_declared(&ControllerClass::of::<C>()) {
                registry.declare::<C>()?;
            }
            registry.bind(instance)
        }));
        self
    }

    /// Register `C` manually once the service is initialized, whether or not
    /// auto-discovery is on.
    pub fn register<C>(mut self) -> Self
    where
        C: RpcController + StatefulConstruct<S>,
    {
        self.registrations.push(Box::new(|state: &S, service: &AutoRouter| {
            service.register_controller(Arc::new(C::from_state(state)))
        }));
        self
    }

    pub fn register_instance<C: RpcController>(mut self, instance: Arc<C>) -> Self {
        self.registrations.push(Box::new(move |_: &S, service: &AutoRouter| {
            service.register_controller(instance)
        }));
        self
    }

    /// Replace the introspector behind the info endpoint.
    pub fn with_introspector(mut self, introspector: Arc<dyn RouterIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    /// Merge extra axum routes next to the rpc endpoints.
    pub fn merge_router(mut self, router: axum::Router) -> Self {
        self.routes.push(router);
        self
    }

    /// Bind controllers, run both lifecycle hooks and assemble the HTTP
    /// router.
    pub fn build(self) -> Result<RpcRuntime, RpcError> {
        let service = Arc::new(AutoRouter::new(
            self.registry.clone(),
            self.settings.discovery_options(),
        ));

        for bind in self.bindings {
            bind(&self.state, &self.registry)?;
        }
        service.on_module_init();
        for register in self.registrations {
            register(&self.state, &service)?;
        }
        service.on_application_bootstrap();

        let mut router = axum::Router::new();
        if self.settings.http_enabled {
            let mut http = RpcHttp::from_settings(service.clone(), &self.settings);
            if let Some(introspector) = self.introspector {
                http = http.introspector(introspector);
            }
            router = router.merge(http.routes());
        }
        for extra in self.routes {
            router = router.merge(extra);
        }
        let router = router.layer(TraceLayer::new_for_http());

        Ok(RpcRuntime {
            service,
            router,
            settings: self.settings,
        })
    }

    /// Build and serve on `rpc.server.addr` until Ctrl-C or SIGTERM.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        self.build()?.serve().await
    }
}

/// A built application: the aggregation service and its HTTP router.
pub struct RpcRuntime {
    service: Arc<AutoRouter>,
    router: axum::Router,
    settings: RpcSettings,
}

impl RpcRuntime {
    pub fn service(&self) -> &Arc<AutoRouter> {
        &self.service
    }

    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    pub fn into_router(self) -> axum::Router {
        self.router
    }

    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.settings.server_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            prefix = %self.settings.http_prefix,
            routers = ?self.service.router_names(),
            "rpcnest server listening"
        );
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        global::clear_auto_router();
        info!("rpcnest server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
