use std::any::Any;

use crate::procedure::ProcedureData;
use crate::server::ServerHandle;
use crate::types::RequestId;

/// Per-request state handed to a [`Procedure`](crate::Procedure)
///
/// Lives for exactly one dispatch. The server handle lets a procedure stop
/// the server or change the registry without reaching for global state.
#[derive(Clone)]
pub struct InvocationContext {
    method: String,
    id: Option<RequestId>,
    data: Option<ProcedureData>,
    server: ServerHandle,
}

impl InvocationContext {
    pub(crate) fn new(
        method: String,
        id: Option<RequestId>,
        data: Option<ProcedureData>,
        server: ServerHandle,
    ) -> Self {
        Self {
            method,
            id,
            data,
            server,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request id; `None` for an explicit null id
    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// The data registered alongside the procedure, if it is a `T`
    pub fn data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }

    pub fn raw_data(&self) -> Option<&ProcedureData> {
        self.data.as_ref()
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("method", &self.method)
            .field("id", &self.id)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
