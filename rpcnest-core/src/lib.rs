//! Core runtime of rpcnest: procedure metadata, the controller registry,
//! router assembly, the aggregation service and streaming helpers.

pub mod auto_router;
pub mod config;
pub mod content;
pub mod controller;
pub mod error;
pub mod global;
mod lock;
pub mod logging;
pub mod meta;
pub mod output;
pub mod prelude;
pub mod registry;
pub mod router;
pub mod schema;
pub mod settings;
pub mod stream;

pub use auto_router::{
    router_name, AutoRouter, ControllerInfo, DiscoveryOptions, Phase, RegisteredController,
    UnboundPolicy,
};
pub use config::{ConfigError, ConfigValue, FromConfigValue, RpcConfig};
pub use controller::{
    decode_input, stream_handler, typed_handler, ControllerDecl, ControllerInstance,
    ErasedMethod, Handler, HandlerFuture, RpcController, StatefulConstruct,
};
pub use error::{FieldError, RpcError};
pub use logging::{init_tracing, LogFormat};
pub use meta::{
    ContentType, ControllerClass, MetadataRegistry, MethodRef, ProcedureKind, ProcedureMeta,
    RouterMeta,
};
pub use output::{
    Emitter, IntoProcedureResult, IntoProcedureStream, Observer, ProcedureOutput, Sequence,
    Teardown, ValueStream,
};
pub use registry::{ControllerEntry, ControllerRegistration, ControllerRegistry};
pub use router::{Procedure, Router, RouterBuilder};
pub use schema::Schema;
pub use settings::RpcSettings;
pub use stream::{paced, sse_frames, Chunk, PaceOptions};

/// Items used by code generated by `#[rpc_router]`. Not a public API.
#[doc(hidden)]
pub mod __macro_support {
    pub use std::boxed::Box;
    pub use std::sync::Arc;

    pub use inventory;
    pub use serde_json::Value;

    pub use crate::controller::{
        decode_input, stream_handler, typed_handler, ControllerDecl, Handler, HandlerFuture,
        RpcController,
    };
    pub use crate::error::RpcError;
    pub use crate::meta::{ContentType, ProcedureKind, ProcedureMeta};
    pub use crate::output::{IntoProcedureResult, IntoProcedureStream};
    pub use crate::registry::{declare_erased, ControllerRegistration};
    pub use crate::schema::{Schema, __AutoValidator, __DoValidate, __SkipValidate};
}
