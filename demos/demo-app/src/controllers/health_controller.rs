use rpcnest::prelude::*;
use serde_json::{json, Value};

/// Built through `Default` by discovery: nothing binds it.
#[derive(Default)]
pub struct HealthController;

#[rpc_router(prefix = "health", default_instance)]
impl HealthController {
    #[query]
    fn check(&self) -> Result<Value, RpcError> {
        Ok(json!({ "status": "UP" }))
    }
}
