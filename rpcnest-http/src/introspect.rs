//! Listing the procedures the HTTP layer can resolve.

use std::collections::BTreeMap;

use rpcnest_core::{AutoRouter, RpcError};

/// Lists resolvable `router.procedure` names.
pub trait RouterIntrospector: Send + Sync {
    fn procedures(&self, service: &AutoRouter) -> Result<Vec<String>, RpcError>;
}

/// Walks the assembled main router, nested routers included.
#[derive(Debug, Default, Clone, Copy)]
pub struct MainRouterIntrospector;

impl RouterIntrospector for MainRouterIntrospector {
    fn procedures(&self, service: &AutoRouter) -> Result<Vec<String>, RpcError> {
        Ok(service.get_main_router().procedure_paths())
    }
}

/// Guessed procedure names, used when introspection fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticProcedureHints {
    pub defaults: Vec<String>,
    pub extras: BTreeMap<String, Vec<String>>,
}

impl Default for StaticProcedureHints {
    fn default() -> Self {
        let defaults = ["getAll", "getById", "create", "update", "delete"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut extras = BTreeMap::new();
        extras.insert("users".to_string(), vec!["search".to_string()]);
        extras.insert("posts".to_string(), vec!["getByAuthor".to_string()]);
        Self { defaults, extras }
    }
}

impl StaticProcedureHints {
    /// Add extra names per router on top of the built-in ones.
    pub fn with_extras(mut self, extras: &BTreeMap<String, Vec<String>>) -> Self {
        for (router, names) in extras {
            let entry = self.extras.entry(router.clone()).or_default();
            for name in names {
                if !entry.contains(name) {
                    entry.push(name.clone());
                }
            }
        }
        self
    }

    /// Heuristic names for each router, in router order.
    pub fn procedures_for<'a>(&self, routers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut out = Vec::new();
        for router in routers {
            let extras = self.extras.get(router).into_iter().flatten();
            for name in self.defaults.iter().chain(extras) {
                out.push(format!("{router}.{name}"));
            }
        }
        out
    }
}

/// How the procedure list of an info response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectionSource {
    Router,
    Fallback,
}

impl IntrospectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntrospectionSource::Router => "router",
            IntrospectionSource::Fallback => "fallback",
        }
    }
}

/// Introspect, falling back to `hints` for every registered router name.
pub fn list_procedures(
    service: &AutoRouter,
    introspector: &dyn RouterIntrospector,
    hints: &StaticProcedureHints,
) -> (Vec<String>, IntrospectionSource) {
    match introspector.procedures(service) {
        Ok(procedures) => (procedures, IntrospectionSource::Router),
        Err(error) => {
            tracing::warn!(%error, "Router introspection failed, using static procedure hints");
            let names = service.router_names();
            let procedures = hints.procedures_for(names.iter().map(String::as_str));
            (procedures, IntrospectionSource::Fallback)
        }
    }
}

/// Group `router.procedure` names by router.
pub fn group_by_router(procedures: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in procedures {
        if let Some((router, procedure)) = path.split_once('.') {
            grouped
                .entry(router.to_string())
                .or_default()
                .push(procedure.to_string());
        }
    }
    grouped
}
