//! Commonly used types, for `use rpcnest_core::prelude::*`.

pub use crate::auto_router::{AutoRouter, UnboundPolicy};
pub use crate::controller::{ControllerDecl, RpcController, StatefulConstruct};
pub use crate::error::RpcError;
pub use crate::meta::{ContentType, ProcedureKind, ProcedureMeta};
pub use crate::output::{Emitter, Observer, ProcedureOutput, Sequence, Teardown};
pub use crate::registry::ControllerRegistry;
pub use crate::schema::Schema;
pub use crate::stream::{paced, Chunk, PaceOptions};
