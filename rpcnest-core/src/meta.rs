use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::controller::ErasedMethod;
use crate::error::RpcError;
use crate::lock;
use crate::schema::Schema;

/// The three procedure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutation",
            ProcedureKind::Subscription => "subscription",
        })
    }
}

/// Input encoding a mutation accepts. Queries and subscriptions are always JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "formdata")]
    FormData,
    #[serde(rename = "octet-stream")]
    OctetStream,
    #[serde(rename = "text")]
    Text,
}

impl ContentType {
    /// The MIME type clients send for this encoding.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormData => "application/x-www-form-urlencoded",
            ContentType::OctetStream => "application/octet-stream",
            ContentType::Text => "text/plain",
        }
    }

    /// Map an HTTP `Content-Type` header value to an encoding. Parameters such
    /// as `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/json" => Some(ContentType::Json),
            "application/x-www-form-urlencoded" | "multipart/form-data" => {
                Some(ContentType::FormData)
            }
            "application/octet-stream" => Some(ContentType::OctetStream),
            m if m.starts_with("text/") => Some(ContentType::Text),
            m if m.ends_with("+json") => Some(ContentType::Json),
            _ => None,
        }
    }
}

impl FromStr for ContentType {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ContentType::Json),
            "formdata" | "form-data" => Ok(ContentType::FormData),
            "octet-stream" | "octetstream" | "binary" => Ok(ContentType::OctetStream),
            "text" => Ok(ContentType::Text),
            other => Err(RpcError::Declaration(format!(
                "unknown content type '{other}', expected json, formdata, octet-stream or text"
            ))),
        }
    }
}

/// Everything declared about one procedure method.
#[derive(Debug, Clone)]
pub struct ProcedureMeta {
    pub kind: ProcedureKind,
    /// Name the procedure is exposed under. Defaults to the method name.
    pub path: String,
    pub method_name: String,
    pub input_schema: Option<Schema>,
    pub output_schema: Option<Schema>,
    pub streaming: bool,
    pub content_type: ContentType,
    pub server_sent_events: bool,
}

impl ProcedureMeta {
    pub fn new(kind: ProcedureKind, method_name: impl Into<String>) -> Self {
        let method_name = method_name.into();
        Self {
            kind,
            path: method_name.clone(),
            method_name,
            input_schema: None,
            output_schema: None,
            streaming: false,
            content_type: ContentType::Json,
            server_sent_events: false,
        }
    }

    pub fn query(method_name: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Query, method_name)
    }

    pub fn mutation(method_name: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Mutation, method_name)
    }

    pub fn subscription(method_name: impl Into<String>) -> Self {
        Self::new(ProcedureKind::Subscription, method_name)
    }

    /// Override the exposed name. An empty path keeps the method name.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !path.is_empty() {
            self.path = path;
        }
        self
    }

    pub fn with_input(mut self, schema: Schema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn sse(mut self) -> Self {
        self.server_sent_events = true;
        self
    }
}

/// Router-level metadata of a controller class.
#[derive(Debug, Clone, Default)]
pub struct RouterMeta {
    /// Optional name prefix. Empty means "derive from the class name".
    pub path: String,
    /// Procedure path to metadata, filled in when a router is generated.
    pub procedures: BTreeMap<String, ProcedureMeta>,
}

impl RouterMeta {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            procedures: BTreeMap::new(),
        }
    }
}

/// Identity of a controller type.
///
/// Equality and hashing go through the `TypeId`; the name is only carried
/// for logs and router name derivation.
#[derive(Debug, Clone, Copy)]
pub struct ControllerClass {
    type_id: TypeId,
    name: &'static str,
}

impl ControllerClass {
    pub fn of<C: 'static>() -> Self {
        Self::named::<C>(short_type_name(std::any::type_name::<C>()))
    }

    pub fn named<C: 'static>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl PartialEq for ControllerClass {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ControllerClass {}

impl Hash for ControllerClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for ControllerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Key of a procedure method: the controller class plus the method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: ControllerClass,
    pub method: String,
}

impl MethodRef {
    pub fn new(class: ControllerClass, method: impl Into<String>) -> Self {
        Self {
            class,
            method: method.into(),
        }
    }
}

/// Stores router metadata per controller class, procedure metadata per
/// method, and each class's method table.
///
/// Writes overwrite; reads of unknown keys return `None`.
#[derive(Default)]
pub struct MetadataRegistry {
    routers: RwLock<HashMap<ControllerClass, RouterMeta>>,
    procedures: RwLock<HashMap<MethodRef, ProcedureMeta>>,
    methods: RwLock<HashMap<ControllerClass, Vec<ErasedMethod>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_router_metadata(&self, class: ControllerClass, meta: RouterMeta) {
        lock::write(&self.routers).insert(class, meta);
    }

    pub fn get_router_metadata(&self, class: &ControllerClass) -> Option<RouterMeta> {
        lock::read(&self.routers).get(class).cloned()
    }

    pub fn is_router(&self, class: &ControllerClass) -> bool {
        lock::read(&self.routers).contains_key(class)
    }

    /// Record procedure metadata for a method. Empty method names are rejected.
    pub fn set_procedure_metadata(
        &self,
        method: MethodRef,
        meta: ProcedureMeta,
    ) -> Result<(), RpcError> {
        if method.method.is_empty() {
            return Err(RpcError::Declaration(format!(
                "procedure metadata on {} needs a method name",
                method.class
            )));
        }
        lock::write(&self.procedures).insert(method, meta);
        Ok(())
    }

    pub fn get_procedure_metadata(&self, method: &MethodRef) -> Option<ProcedureMeta> {
        lock::read(&self.procedures).get(method).cloned()
    }

    /// Replace the method table of a class.
    pub fn set_methods(&self, class: ControllerClass, methods: Vec<ErasedMethod>) {
        lock::write(&self.methods).insert(class, methods);
    }

    /// The class's methods, in declaration order.
    pub fn methods(&self, class: &ControllerClass) -> Vec<ErasedMethod> {
        lock::read(&self.methods)
            .get(class)
            .cloned()
            .unwrap_or_default()
    }

    pub fn method(&self, class: &ControllerClass, name: &str) -> Option<ErasedMethod> {
        lock::read(&self.methods)
            .get(class)
            .and_then(|methods| methods.iter().find(|m| m.name() == name).cloned())
    }

    /// Record the procedures a generated router exposes on the class's
    /// router metadata.
    pub(crate) fn record_procedures(
        &self,
        class: &ControllerClass,
        procedures: BTreeMap<String, ProcedureMeta>,
    ) {
        if let Some(meta) = lock::write(&self.routers).get_mut(class) {
            meta.procedures = procedures;
        }
    }
}
