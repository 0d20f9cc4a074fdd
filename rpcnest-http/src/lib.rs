//! axum transport for rpcnest.
//!
//! Mounts these endpoints under one prefix (`/trpc` by default):
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `{prefix}/{router.procedure}` | single call, body is the input |
//! | GET | `{prefix}/{router.procedure}?input=<json>` | single call |
//! | GET | `{prefix}/{a},{b}?batch=1&input=<json keyed "0","1",...>` | batch |
//! | POST | `{prefix}` | batch, body is `{id: {procedure, input}}` |
//! | GET | `{prefix}` | introspection |

pub mod dispatch;
pub mod error;
pub mod input;
pub mod introspect;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use rpcnest_core::settings::normalize_prefix;
use rpcnest_core::{AutoRouter, RpcSettings};

pub use dispatch::RpcHttpState;
pub use error::{timestamp, HttpRpcError};
pub use introspect::{MainRouterIntrospector, RouterIntrospector, StaticProcedureHints};
pub use sse::{sse_response, SseOptions};

/// Builder for the rpcnest HTTP routes.
pub struct RpcHttp {
    service: Arc<AutoRouter>,
    prefix: String,
    introspector: Arc<dyn RouterIntrospector>,
    hints: StaticProcedureHints,
    sse: SseOptions,
}

impl RpcHttp {
    pub fn new(service: Arc<AutoRouter>) -> Self {
        Self {
            service,
            prefix: "/trpc".to_string(),
            introspector: Arc::new(MainRouterIntrospector),
            hints: StaticProcedureHints::default(),
            sse: SseOptions::default(),
        }
    }

    /// Prefix, heartbeat and hints taken from `settings`.
    pub fn from_settings(service: Arc<AutoRouter>, settings: &RpcSettings) -> Self {
        Self::new(service)
            .prefix(&settings.http_prefix)
            .heartbeat(settings.sse_heartbeat)
            .hints(StaticProcedureHints::default().with_extras(&settings.hints))
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }

    pub fn introspector(mut self, introspector: Arc<dyn RouterIntrospector>) -> Self {
        self.introspector = introspector;
        self
    }

    pub fn hints(mut self, hints: StaticProcedureHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.sse.heartbeat = heartbeat;
        self
    }

    pub fn sse_options(mut self, options: SseOptions) -> Self {
        self.sse = options;
        self
    }

    pub fn mount_prefix(&self) -> &str {
        &self.prefix
    }

    /// The axum routes, ready to merge into an application router.
    pub fn routes<S>(self) -> axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let base = self.prefix.trim_end_matches('/').to_string();
        let root = if base.is_empty() { "/".to_string() } else { base.clone() };
        let call = format!("{base}/{{procedure}}");

        tracing::info!(prefix = %root, "Mounting rpc HTTP endpoints");
        let state = RpcHttpState {
            service: self.service,
            introspector: self.introspector,
            hints: Arc::new(self.hints),
            sse: self.sse,
            prefix: root.clone(),
        };
        axum::Router::new()
            .route(&root, get(dispatch::info).post(dispatch::post_batch))
            .route(&call, get(dispatch::get_call).post(dispatch::post_single))
            .with_state(state)
    }
}
