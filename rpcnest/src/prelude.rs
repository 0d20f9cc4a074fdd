//! `use rpcnest::prelude::*;` brings controllers, outputs and the app builder
//! into scope.

pub use rpcnest_core::prelude::*;
pub use rpcnest_http::{RouterIntrospector, RpcHttp, SseOptions};
pub use rpcnest_macros::{mutation, query, rpc_router, subscription};

pub use crate::app::{RpcApp, RpcRuntime};
