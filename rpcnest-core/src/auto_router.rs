use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::controller::{ControllerInstance, RpcController};
use crate::error::RpcError;
use crate::global;
use crate::lock;
use crate::meta::{ControllerClass, MethodRef, ProcedureMeta, RouterMeta};
use crate::output::ProcedureOutput;
use crate::registry::{ControllerEntry, ControllerRegistry};
use crate::router::{Procedure, Router, RouterBuilder};

/// Lifecycle phase of the aggregation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Built,
    Discovering,
}

/// What discovery does with a declared controller that has no bound instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnboundPolicy {
    /// Skip the controller and log an error.
    #[default]
    Fail,
    /// Build it through its opt-in `Default` factory. Controllers without
    /// one are skipped.
    DefaultConstruct,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub auto_discovery: bool,
    pub unbound: UnboundPolicy,
}

/// A controller known to the service under its router name.
#[derive(Clone, Debug)]
pub struct RegisteredController {
    pub class: ControllerClass,
    pub instance: ControllerInstance,
    pub router_metadata: RouterMeta,
    /// Procedure path to method name.
    pub procedure_to_method: BTreeMap<String, String>,
}

/// Public summary of a registered controller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerInfo {
    pub name: String,
    pub class_name: String,
    pub prefix: String,
}

struct State {
    phase: Phase,
    registered: BTreeMap<String, RegisteredController>,
    main_router: Option<Arc<Router>>,
}

/// Discovers controllers, keeps them by router name and maintains the main
/// router built from all of them.
///
/// The main router is rebuilt from scratch after every registration.
pub struct AutoRouter {
    registry: ControllerRegistry,
    builder: RouterBuilder,
    auto_discovery: AtomicBool,
    unbound: UnboundPolicy,
    state: RwLock<State>,
}

/// Router name of a controller: its prefix, or the class name without a
/// trailing `Controller` and with a lower-case first letter.
pub fn router_name(class_name: &str, prefix: &str) -> String {
    if !prefix.is_empty() {
        return prefix.to_string();
    }
    let base = class_name.strip_suffix("Controller").unwrap_or(class_name);
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => class_name.to_lowercase(),
    }
}

impl AutoRouter {
    pub fn new(registry: ControllerRegistry, options: DiscoveryOptions) -> Self {
        let builder = RouterBuilder::new(Arc::clone(registry.metadata()));
        Self {
            registry,
            builder,
            auto_discovery: AtomicBool::new(options.auto_discovery),
            unbound: options.unbound,
            state: RwLock::new(State {
                phase: Phase::Uninitialized,
                registered: BTreeMap::new(),
                main_router: None,
            }),
        }
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    pub fn phase(&self) -> Phase {
        lock::read(&self.state).phase
    }

    pub fn auto_discovery_enabled(&self) -> bool {
        self.auto_discovery.load(Ordering::Relaxed)
    }

    pub fn enable_auto_discovery(&self) {
        self.auto_discovery.store(true, Ordering::Relaxed);
    }

    /// Publish the service as the process-wide resolver and build an empty
    /// main router.
    pub fn on_module_init(self: &Arc<Self>) {
        global::set_auto_router(Arc::clone(self));
        self.rebuild();
        debug!("Auto router initialized");
    }

    /// Run discovery when enabled, then rebuild the main router.
    pub fn on_application_bootstrap(&self) {
        if self.auto_discovery_enabled() {
            let found = self.perform_auto_discovery();
            info!(registered = found, "Auto-discovery complete");
        }
        self.rebuild();
    }

    /// Register every declared controller not registered yet. Returns how
    /// many were added. Running it twice adds nothing the second time.
    ///
    /// A controller whose router fails to build is logged and left out, so
    /// it counts as not added.
    pub fn perform_auto_discovery(&self) -> usize {
        lock::write(&self.state).phase = Phase::Discovering;

        let mut added = 0;
        for entry in self.registry.entries() {
            let Some(meta) = self.registry.metadata().get_router_metadata(&entry.class) else {
                continue;
            };
            let name = router_name(entry.class.name(), &meta.path);
            if lock::read(&self.state).registered.contains_key(&name) {
                debug!(router = %name, "Controller already registered, skipping");
                continue;
            }
            let Some(instance) = self.resolve_instance(&entry) else {
                continue;
            };
            if let Err(e) = self.builder.generate_router(&entry.class, instance.clone()) {
                error!(
                    router = %name,
                    class = entry.class.name(),
                    error = %e,
                    "Failed to build router, skipping controller"
                );
                continue;
            }
            let controller = self.registration(entry.class, instance, meta);
            lock::write(&self.state).registered.insert(name.clone(), controller);
            info!(router = %name, class = entry.class.name(), "Discovered controller");
            added += 1;
        }

        self.rebuild();
        added
    }

    fn resolve_instance(&self, entry: &ControllerEntry) -> Option<ControllerInstance> {
        if let Some(instance) = entry.instance() {
            return Some(instance.clone());
        }
        match self.unbound {
            UnboundPolicy::Fail => {
                error!(
                    class = entry.class.name(),
                    "Controller has no bound instance, skipping it"
                );
                None
            }
            UnboundPolicy::DefaultConstruct => {
                let instance = entry.default_instance();
                if instance.is_none() {
                    warn!(
                        class = entry.class.name(),
                        "Controller has no bound instance and no default factory, skipping it"
                    );
                }
                instance
            }
        }
    }

    fn registration(
        &self,
        class: ControllerClass,
        instance: ControllerInstance,
        router_metadata: RouterMeta,
    ) -> RegisteredController {
        let metadata = self.registry.metadata();
        let procedure_to_method = metadata
            .methods(&class)
            .iter()
            .filter_map(|method| {
                metadata
                    .get_procedure_metadata(&MethodRef::new(class, method.name()))
                    .map(|meta| (meta.path, method.name().to_string()))
            })
            .collect();
        RegisteredController {
            class,
            instance,
            router_metadata,
            procedure_to_method,
        }
    }

    /// Register a controller by hand and rebuild the main router.
    pub fn register_controller<C: RpcController>(&self, instance: Arc<C>) -> Result<(), RpcError> {
        if !self.registry.is_declared(&ControllerClass::of::<C>()) {
            self.registry.declare::<C>()?;
        }
        self.register_instance(ControllerInstance::new(instance))
    }

    /// Register an already declared controller instance and rebuild.
    /// Nothing is registered when its router fails to build.
    pub fn register_instance(&self, instance: ControllerInstance) -> Result<(), RpcError> {
        let class = instance.class();
        let meta = self
            .registry
            .metadata()
            .get_router_metadata(&class)
            .ok_or_else(|| RpcError::NotARouter {
                class: class.name().to_string(),
            })?;
        let name = router_name(class.name(), &meta.path);
        self.builder.generate_router(&class, instance.clone())?;
        let controller = self.registration(class, instance, meta);
        lock::write(&self.state).registered.insert(name.clone(), controller);
        info!(router = %name, class = class.name(), "Registered controller");
        self.rebuild();
        Ok(())
    }

    fn rebuild(&self) -> Arc<Router> {
        let mut state = lock::write(&self.state);
        let mut main = Router::new();
        for (name, controller) in &state.registered {
            match self
                .builder
                .generate_router(&controller.class, controller.instance.clone())
            {
                Ok(router) => main.nest(name.clone(), router),
                Err(e) => error!(router = %name, error = %e, "Failed to build router, omitting it"),
            }
        }
        let main = Arc::new(main);
        state.main_router = Some(Arc::clone(&main));
        state.phase = Phase::Built;
        debug!(routers = state.registered.len(), "Main router rebuilt");
        main
    }

    /// The cached main router, built on first use.
    pub fn get_main_router(&self) -> Arc<Router> {
        if let Some(router) = &lock::read(&self.state).main_router {
            return Arc::clone(router);
        }
        self.rebuild()
    }

    /// Force a rebuild of the main router.
    pub fn refresh_main_router(&self) -> Arc<Router> {
        self.rebuild()
    }

    pub fn router_names(&self) -> Vec<String> {
        lock::read(&self.state).registered.keys().cloned().collect()
    }

    pub fn registered_controllers(&self) -> Vec<ControllerInfo> {
        lock::read(&self.state)
            .registered
            .iter()
            .map(|(name, c)| ControllerInfo {
                name: name.clone(),
                class_name: c.class.name().to_string(),
                prefix: c.router_metadata.path.clone(),
            })
            .collect()
    }

    pub fn registered(&self, router: &str) -> Option<RegisteredController> {
        lock::read(&self.state).registered.get(router).cloned()
    }

    /// Metadata of a registered procedure.
    pub fn procedure_meta(&self, router: &str, procedure: &str) -> Option<ProcedureMeta> {
        let controller = self.registered(router)?;
        let method = controller.procedure_to_method.get(procedure)?;
        self.registry
            .metadata()
            .get_procedure_metadata(&MethodRef::new(controller.class, method.as_str()))
    }

    /// Call `router.procedure` directly on the registered instance, through
    /// the same coercion and schema steps as the main router.
    ///
    /// Handler failures come back wrapped in [`RpcError::Call`]; lookup
    /// failures are returned as they are.
    pub async fn call_procedure(
        &self,
        router: &str,
        procedure: &str,
        input: Value,
    ) -> Result<ProcedureOutput, RpcError> {
        let controller = self.registered(router).ok_or_else(|| RpcError::RouterNotFound {
            router: router.to_string(),
            available: self.router_names(),
        })?;
        let not_found = || RpcError::ProcedureNotFound {
            router: router.to_string(),
            procedure: procedure.to_string(),
            available: controller.procedure_to_method.keys().cloned().collect(),
        };
        let method_name = controller
            .procedure_to_method
            .get(procedure)
            .ok_or_else(not_found)?;
        let metadata = self.registry.metadata();
        let method = metadata
            .method(&controller.class, method_name)
            .ok_or_else(not_found)?;
        let meta = metadata
            .get_procedure_metadata(&MethodRef::new(controller.class, method_name.as_str()))
            .ok_or_else(not_found)?;

        debug!(router, procedure, "Calling procedure");
        Procedure::new(meta, method, controller.instance.clone())
            .call(input)
            .await
            .map_err(|e| RpcError::Call {
                router: router.to_string(),
                procedure: procedure.to_string(),
                source: Box::new(e),
            })
    }
}
