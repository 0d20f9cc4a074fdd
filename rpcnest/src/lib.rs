//! rpcnest: procedure routers declared on plain Rust types, discovered at
//! startup and served over axum.
//!
//! ```ignore
//! use rpcnest::prelude::*;
//!
//! #[rpc_router]
//! impl UsersController {
//!     #[query("getById")]
//!     async fn get_by_id(&self, id: u64) -> Result<User, RpcError> { /* ... */ }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     RpcApp::new()
//!         .with_state(services)
//!         .auto_discovery(true)
//!         .bind::<UsersController>()
//!         .serve()
//!         .await
//! }
//! ```

// Generated code names this crate as `::rpcnest`, including inside it.
extern crate self as rpcnest;

// The proc macros use `proc-macro-crate` to detect whether the user depends
// on `rpcnest` or on `rpcnest-core` directly, and generate matching paths.
pub extern crate rpcnest_core;
pub extern crate rpcnest_macros;

pub use rpcnest_core::*;
pub use rpcnest_http;
pub use rpcnest_macros::{mutation, query, rpc_router, subscription};

mod app;
pub mod prelude;

pub use app::{RpcApp, RpcRuntime};
