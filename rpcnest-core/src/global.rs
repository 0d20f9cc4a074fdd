//! Process-wide access to the aggregation service, for code that has no
//! handle on the application state.

use std::sync::{Arc, RwLock};

use crate::auto_router::{AutoRouter, ControllerInfo};
use crate::error::RpcError;
use crate::lock;
use crate::router::Router;

static AUTO_ROUTER: RwLock<Option<Arc<AutoRouter>>> = RwLock::new(None);

/// Publish `service` as the process-wide resolver, replacing any previous one.
pub fn set_auto_router(service: Arc<AutoRouter>) {
    *lock::write(&AUTO_ROUTER) = Some(service);
}

pub fn clear_auto_router() {
    *lock::write(&AUTO_ROUTER) = None;
}

pub fn auto_router() -> Result<Arc<AutoRouter>, RpcError> {
    lock::read(&AUTO_ROUTER)
        .clone()
        .ok_or(RpcError::NotInitialized)
}

/// The main router of the published service.
pub fn main_router() -> Result<Arc<Router>, RpcError> {
    auto_router().map(|service| service.get_main_router())
}

pub fn registered_controllers() -> Result<Vec<ControllerInfo>, RpcError> {
    auto_router().map(|service| service.registered_controllers())
}
