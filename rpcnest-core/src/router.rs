use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::content;
use crate::controller::{ControllerInstance, ErasedMethod};
use crate::error::RpcError;
use crate::meta::{ControllerClass, MetadataRegistry, MethodRef, ProcedureKind, ProcedureMeta};
use crate::output::ProcedureOutput;
use crate::schema::Schema;

/// A callable procedure bound to a controller instance.
#[derive(Clone)]
pub struct Procedure {
    meta: Arc<ProcedureMeta>,
    method: ErasedMethod,
    instance: ControllerInstance,
}

impl Procedure {
    pub fn new(meta: ProcedureMeta, method: ErasedMethod, instance: ControllerInstance) -> Self {
        Self {
            meta: Arc::new(meta),
            method,
            instance,
        }
    }

    pub fn meta(&self) -> &ProcedureMeta {
        &self.meta
    }

    pub fn kind(&self) -> ProcedureKind {
        self.meta.kind
    }

    /// Run the procedure: content coercion for mutations, input schema,
    /// handler, output schema, then subscription adaption.
    pub async fn call(&self, input: Value) -> Result<ProcedureOutput, RpcError> {
        let meta = &self.meta;
        let input = if meta.kind == ProcedureKind::Mutation {
            content::coerce_input(meta.content_type, input)?
        } else {
            input
        };
        let input = match &meta.input_schema {
            Some(schema) => schema.parse(input)?,
            None => input,
        };

        let output = self.method.call(self.instance.clone(), input).await?;

        let output = match &meta.output_schema {
            Some(schema) => apply_output_schema(schema.clone(), output)?,
            None => output,
        };

        Ok(match meta.kind {
            ProcedureKind::Subscription => ProcedureOutput::Sequence(output.into_stream()),
            ProcedureKind::Query | ProcedureKind::Mutation => output,
        })
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.meta.kind)
            .field("path", &self.meta.path)
            .finish()
    }
}

fn apply_output_schema(
    schema: Schema,
    output: ProcedureOutput,
) -> Result<ProcedureOutput, RpcError> {
    match output {
        ProcedureOutput::Single(value) => schema.parse(value).map(ProcedureOutput::Single),
        streaming => Ok(ProcedureOutput::Sequence(
            streaming
                .into_stream()
                .map(move |item| item.and_then(|value| schema.parse(value)))
                .boxed(),
        )),
    }
}

/// A tree of procedures: procedures keyed by path plus named child routers.
#[derive(Clone, Debug, Default)]
pub struct Router {
    procedures: BTreeMap<String, Procedure>,
    children: BTreeMap<String, Router>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a procedure. A path that is already taken is a declaration error.
    pub fn insert_procedure(
        &mut self,
        path: impl Into<String>,
        procedure: Procedure,
    ) -> Result<(), RpcError> {
        let path = path.into();
        if self.procedures.contains_key(&path) {
            return Err(RpcError::Declaration(format!(
                "procedure path '{path}' is declared twice"
            )));
        }
        self.procedures.insert(path, procedure);
        Ok(())
    }

    /// Mount a child router under `name`, replacing any previous one.
    pub fn nest(&mut self, name: impl Into<String>, router: Router) {
        self.children.insert(name.into(), router);
    }

    pub fn procedures(&self) -> &BTreeMap<String, Procedure> {
        &self.procedures
    }

    pub fn children(&self) -> &BTreeMap<String, Router> {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Router> {
        self.children.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty() && self.children.is_empty()
    }

    /// Resolve a dotted path such as `users.getById`.
    pub fn procedure(&self, path: &str) -> Option<&Procedure> {
        if let Some(found) = self.procedures.get(path) {
            return Some(found);
        }
        let (head, rest) = path.split_once('.')?;
        self.children.get(head)?.procedure(rest)
    }

    /// Call a procedure by dotted path.
    pub async fn call(&self, path: &str, input: Value) -> Result<ProcedureOutput, RpcError> {
        match self.procedure(path) {
            Some(procedure) => procedure.call(input).await,
            None => Err(self.miss(path)),
        }
    }

    fn miss(&self, path: &str) -> RpcError {
        match path.split_once('.') {
            Some((head, rest)) => match self.children.get(head) {
                Some(child) => RpcError::ProcedureNotFound {
                    router: head.to_string(),
                    procedure: rest.to_string(),
                    available: child.procedure_paths(),
                },
                None => RpcError::RouterNotFound {
                    router: head.to_string(),
                    available: self.children.keys().cloned().collect(),
                },
            },
            None => RpcError::ProcedureNotFound {
                router: String::new(),
                procedure: path.to_string(),
                available: self.procedure_paths(),
            },
        }
    }

    /// Every resolvable dotted path, sorted.
    pub fn procedure_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.procedures.keys().cloned().collect();
        for (name, child) in &self.children {
            paths.extend(
                child
                    .procedure_paths()
                    .into_iter()
                    .map(|p| format!("{name}.{p}")),
            );
        }
        paths.sort();
        paths
    }
}

/// Builds one router per controller from its declared metadata.
#[derive(Clone)]
pub struct RouterBuilder {
    metadata: Arc<MetadataRegistry>,
}

impl RouterBuilder {
    pub fn new(metadata: Arc<MetadataRegistry>) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    /// Build the router of `class`, bound to `instance`.
    ///
    /// Methods without procedure metadata are skipped.
    pub fn generate_router(
        &self,
        class: &ControllerClass,
        instance: ControllerInstance,
    ) -> Result<Router, RpcError> {
        if !self.metadata.is_router(class) {
            return Err(RpcError::NotARouter {
                class: class.name().to_string(),
            });
        }
        if instance.class() != *class {
            return Err(RpcError::Declaration(format!(
                "instance of {} cannot back router {}",
                instance.class(),
                class
            )));
        }

        let mut router = Router::new();
        let mut exposed = BTreeMap::new();
        for method in self.metadata.methods(class) {
            let Some(meta) = self
                .metadata
                .get_procedure_metadata(&MethodRef::new(*class, method.name()))
            else {
                continue;
            };
            exposed.insert(meta.path.clone(), meta.clone());
            let path = meta.path.clone();
            router.insert_procedure(path, Procedure::new(meta, method, instance.clone()))?;
        }

        debug!(
            class = class.name(),
            procedures = exposed.len(),
            "Generated controller router"
        );
        self.metadata.record_procedures(class, exposed);
        Ok(router)
    }

    /// The classes in `classes` that carry router metadata.
    pub fn router_classes<'a>(
        &self,
        classes: impl IntoIterator<Item = &'a ControllerClass>,
    ) -> Vec<ControllerClass> {
        classes
            .into_iter()
            .filter(|class| self.metadata.is_router(class))
            .copied()
            .collect()
    }
}
