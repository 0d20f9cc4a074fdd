//! Test utilities for rpcnest applications.

mod app;

pub use app::{resolve_path, TestApp, TestRequest, TestResponse};
