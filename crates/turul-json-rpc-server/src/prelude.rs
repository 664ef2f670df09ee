//! # JSON-RPC Server Prelude
//!
//! This module provides convenient re-exports of the most commonly used types
//! from the JSON-RPC server library.
//!
//! ```rust
//! use turul_json_rpc_server::prelude::*;
//! ```

pub use crate::context::InvocationContext;
pub use crate::diagnostics::ErrorRecord;
pub use crate::error::{JsonRpcError, JsonRpcErrorCode, ProcedureError, RegistryError, ServerError};
pub use crate::procedure::{FunctionProcedure, Procedure, ProcedureData, ProcedureResult};
pub use crate::request::{JsonRpcRequest, RequestParams};
pub use crate::response::{JsonRpcMessage, JsonRpcResponse};
pub use crate::server::{
    JsonRpcServer, NonObjectPolicy, ServerBuilder, ServerConfig, ServerHandle, ServerState,
};
pub use crate::types::{JsonRpcVersion, RequestId};

// Standard error codes
pub use crate::error_codes::*;
