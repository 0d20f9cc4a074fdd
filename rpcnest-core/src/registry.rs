use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::controller::{ControllerInstance, DefaultFactory, ErasedMethod, RpcController};
use crate::error::RpcError;
use crate::lock;
use crate::meta::{ControllerClass, MetadataRegistry, MethodRef, RouterMeta};

/// Declaration-time record submitted by `#[rpc_router]` for every annotated
/// controller linked into the binary.
pub struct ControllerRegistration {
    pub name: &'static str,
    pub declare: fn(&ControllerRegistry) -> Result<(), RpcError>,
}

inventory::collect!(ControllerRegistration);

/// Type-erased entry point stored in [`ControllerRegistration::declare`].
pub fn declare_erased<C: RpcController>(registry: &ControllerRegistry) -> Result<(), RpcError> {
    registry.declare::<C>().map(|_| ())
}

/// A declared controller, optionally bound to a live instance.
#[derive(Clone, Debug)]
pub struct ControllerEntry {
    pub class: ControllerClass,
    pub router_metadata: RouterMeta,
    instance: Option<ControllerInstance>,
    default_factory: Option<DefaultFactory>,
}

impl ControllerEntry {
    pub fn instance(&self) -> Option<&ControllerInstance> {
        self.instance.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.instance.is_some()
    }

    pub fn has_default_factory(&self) -> bool {
        self.default_factory.is_some()
    }

    /// Instance built from the controller's `Default` factory, if it has one.
    pub fn default_instance(&self) -> Option<ControllerInstance> {
        self.default_factory.map(|factory| factory())
    }
}

/// Controller classes with their router metadata and, once the application
/// state built them, their instances.
///
/// Cloning the registry clones the handle; all clones share the entries and
/// the metadata store.
#[derive(Clone)]
pub struct ControllerRegistry {
    metadata: Arc<MetadataRegistry>,
    entries: Arc<Mutex<Vec<ControllerEntry>>>,
}

impl ControllerRegistry {
    /// Empty registry with a fresh metadata store.
    pub fn new() -> Self {
        Self::with_metadata(Arc::new(MetadataRegistry::new()))
    }

    pub fn with_metadata(metadata: Arc<MetadataRegistry>) -> Self {
        Self {
            metadata,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registry holding every controller annotated with `#[rpc_router]`.
    ///
    /// Failing declarations are logged and left out.
    pub fn from_inventory() -> Self {
        let registry = Self::new();
        for registration in inventory::iter::<ControllerRegistration> {
            if let Err(e) = (registration.declare)(&registry) {
                warn!(class = registration.name, error = %e, "Skipping controller declaration");
            }
        }
        registry
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    /// Apply the controller's declaration: router metadata, procedure
    /// metadata and method table. Declaring a class again overwrites its
    /// metadata and keeps a bound instance.
    pub fn declare<C: RpcController>(&self) -> Result<ControllerClass, RpcError> {
        let (class, prefix, methods, default_factory) = C::declaration().into_parts();

        let mut table = Vec::with_capacity(methods.len());
        for method in methods {
            if let Some(meta) = method.meta {
                self.metadata
                    .set_procedure_metadata(MethodRef::new(class, method.name.clone()), meta)?;
            }
            table.push(ErasedMethod::erase(method.name, method.handler));
        }

        let router_metadata = RouterMeta::new(prefix);
        self.metadata.set_router_metadata(class, router_metadata.clone());
        self.metadata.set_methods(class, table);

        let mut entries = lock::lock(&self.entries);
        match entries.iter_mut().find(|e| e.class == class) {
            Some(entry) => {
                entry.router_metadata = router_metadata;
                entry.default_factory = default_factory;
            }
            None => entries.push(ControllerEntry {
                class,
                router_metadata,
                instance: None,
                default_factory,
            }),
        }
        debug!(class = class.name(), "Declared controller");
        Ok(class)
    }

    /// Attach a live instance to its declared entry.
    pub fn bind<C: Send + Sync + 'static>(&self, instance: Arc<C>) -> Result<(), RpcError> {
        self.bind_instance(ControllerInstance::new(instance))
    }

    pub fn bind_instance(&self, instance: ControllerInstance) -> Result<(), RpcError> {
        let class = instance.class();
        let mut entries = lock::lock(&self.entries);
        let entry = entries
            .iter_mut()
            .find(|e| e.class == class)
            .ok_or_else(|| RpcError::NotARouter {
                class: class.name().to_string(),
            })?;
        entry.instance = Some(instance);
        debug!(class = class.name(), "Bound controller instance");
        Ok(())
    }

    pub fn is_declared(&self, class: &ControllerClass) -> bool {
        lock::lock(&self.entries).iter().any(|e| e.class == *class)
    }

    pub fn get(&self, class: &ControllerClass) -> Option<ControllerEntry> {
        lock::lock(&self.entries)
            .iter()
            .find(|e| e.class == *class)
            .cloned()
    }

    /// Snapshot of every entry, in declaration order.
    pub fn entries(&self) -> Vec<ControllerEntry> {
        lock::lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock::lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
