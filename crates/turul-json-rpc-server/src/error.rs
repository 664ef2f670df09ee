use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::types::{JsonRpcVersion, RequestId};

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InternalError,
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => crate::error_codes::PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => crate::error_codes::INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => crate::error_codes::METHOD_NOT_FOUND,
            JsonRpcErrorCode::InternalError => crate::error_codes::INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => {
                "Parse error. Invalid JSON was received by the server."
            }
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found.",
            JsonRpcErrorCode::InternalError => "Internal Error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC Error object
///
/// `data` is always emitted; an absent value is written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(JsonRpcErrorCode::ParseError, None, None)
    }

    pub fn invalid_request() -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, None, None)
    }

    pub fn method_not_found() -> Self {
        Self::new(JsonRpcErrorCode::MethodNotFound, None, None)
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }
}

impl From<ProcedureError> for JsonRpcErrorObject {
    fn from(error: ProcedureError) -> Self {
        Self {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// JSON-RPC Error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub error: JsonRpcErrorObject,
    pub id: Option<RequestId>,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            error,
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorObject::parse_error())
    }

    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorObject::invalid_request())
    }

    pub fn method_not_found(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorObject::method_not_found())
    }

    pub fn internal_error(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::internal_error(message))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JSON-RPC Error {}: {}",
            self.error.code, self.error.message
        )
    }
}

impl std::error::Error for JsonRpcError {}

/// Failure reported by a procedure; sent to the client verbatim
#[derive(Debug, Clone, PartialEq, Error)]
#[error("procedure error {code}: {message}")]
pub struct ProcedureError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl ProcedureError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured error data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(crate::error_codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(crate::error_codes::INTERNAL_ERROR, message)
    }
}

/// Registry mutation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("procedure name must not be empty")]
    EmptyName,

    #[error("no procedures are registered")]
    Empty,

    #[error("procedure '{0}' is not registered")]
    NotFound(String),
}

/// Server bootstrap and lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },

    #[error("failed to create socket for {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure socket for {addr}: {source}")]
    SocketOption {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("could not bind to any address for {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to start the event loop: {0}")]
    Runtime(#[source] io::Error),

    #[error("server was bound inside an external runtime; drive it with serve()")]
    RuntimeNotOwned,
}

impl ServerError {
    /// Short tag naming the step that failed
    pub fn cause(&self) -> &'static str {
        match self {
            ServerError::Resolve { .. } | ServerError::ResolveEmpty { .. } => "getaddrinfo",
            ServerError::Socket { .. } => "socket",
            ServerError::SocketOption { .. } => "setsockopt",
            ServerError::Bind { .. } => "bind",
            ServerError::Listen { .. } => "listen",
            ServerError::Runtime(_) | ServerError::RuntimeNotOwned => "runtime",
        }
    }

    /// OS error number, or -1 when the failure did not come from the OS
    pub fn code(&self) -> i32 {
        let source = match self {
            ServerError::Resolve { source, .. }
            | ServerError::Socket { source, .. }
            | ServerError::SocketOption { source, .. }
            | ServerError::Bind { source, .. }
            | ServerError::Listen { source, .. }
            | ServerError::Runtime(source) => Some(source),
            ServerError::ResolveEmpty { .. } | ServerError::RuntimeNotOwned => None,
        };
        source.and_then(io::Error::raw_os_error).unwrap_or(-1)
    }
}
