//! # JSON-RPC 2.0 TCP Server
//!
//! An embeddable JSON-RPC 2.0 server that speaks directly over TCP.
//! Applications register named procedures; the server accepts connections,
//! frames requests as they arrive on the socket, dispatches them and writes
//! back newline-terminated responses.
//!
//! ## Features
//! - Incremental framing: requests may arrive split across reads or
//!   pipelined back to back, with no length prefix or delimiter
//! - Single-threaded event loop; procedures run one at a time, in arrival order
//! - Structured application errors and a last-error record for diagnostics
//! - Blocking `run()` on an owned event loop, or `serve().await` inside an
//!   existing tokio runtime
//!
//! ```no_run
//! use serde_json::json;
//! use turul_json_rpc_server::prelude::*;
//!
//! let mut server = JsonRpcServer::builder().hostname("127.0.0.1").port(1234).build()?;
//! server.register_fn("ping", |_ctx, _params| Ok(json!("pong")))?;
//! server.register_fn("exit", |ctx, _params| {
//!     ctx.server().stop();
//!     Ok(json!("Bye!"))
//! })?;
//! server.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod buffer;
pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod listener;
pub mod prelude;
pub mod procedure;
pub mod reactor;
pub mod request;
pub mod response;
pub mod server;
pub mod types;

// Re-export main types
pub use context::InvocationContext;
pub use diagnostics::ErrorRecord;
pub use error::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, ProcedureError, RegistryError,
    ServerError,
};
pub use procedure::{FunctionProcedure, Procedure, ProcedureData, ProcedureRegistry, ProcedureResult};
pub use request::{InvalidRequest, JsonRpcRequest, RequestParams};
pub use response::{JsonRpcMessage, JsonRpcResponse, STATIC_INTERNAL_ERROR};
pub use server::{
    JsonRpcServer, NonObjectPolicy, ServerBuilder, ServerConfig, ServerHandle, ServerState,
};
pub use types::{JsonRpcVersion, RequestId};

/// Result type for server lifecycle operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}
