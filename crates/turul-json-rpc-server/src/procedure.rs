//! Named procedures and the ordered registry that owns them.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::InvocationContext;
use crate::error::{ProcedureError, RegistryError};
use crate::request::RequestParams;

/// Opaque per-procedure data, handed back to the handler on every call
pub type ProcedureData = Arc<dyn Any + Send + Sync>;

/// Outcome of a procedure call
pub type ProcedureResult = Result<Value, ProcedureError>;

/// Trait for handling a single JSON-RPC method
///
/// Procedures run on the server's event loop, one at a time; a slow
/// procedure delays every other connection.
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, ctx: &InvocationContext, params: RequestParams) -> ProcedureResult;
}

/// Adapts a plain closure into a [`Procedure`]
pub struct FunctionProcedure<F>
where
    F: Fn(&InvocationContext, RequestParams) -> ProcedureResult + Send + Sync,
{
    handler_fn: F,
}

impl<F> FunctionProcedure<F>
where
    F: Fn(&InvocationContext, RequestParams) -> ProcedureResult + Send + Sync,
{
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

#[async_trait]
impl<F> Procedure for FunctionProcedure<F>
where
    F: Fn(&InvocationContext, RequestParams) -> ProcedureResult + Send + Sync,
{
    async fn call(&self, ctx: &InvocationContext, params: RequestParams) -> ProcedureResult {
        (self.handler_fn)(ctx, params)
    }
}

struct RegisteredProcedure {
    name: String,
    procedure: Arc<dyn Procedure>,
    data: Option<ProcedureData>,
}

/// A registry entry resolved for one dispatch
#[derive(Clone)]
pub struct ResolvedProcedure {
    pub procedure: Arc<dyn Procedure>,
    pub data: Option<ProcedureData>,
}

/// Ordered method-name to procedure mapping
///
/// Names are matched exactly and case-sensitively. Duplicates are not
/// rejected: lookup returns the first registered entry with a given name.
#[derive(Default)]
pub struct ProcedureRegistry {
    entries: Vec<RegisteredProcedure>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a procedure under `name`
    pub fn register<P>(
        &mut self,
        name: impl Into<String>,
        procedure: P,
        data: Option<ProcedureData>,
    ) -> Result<(), RegistryError>
    where
        P: Procedure + 'static,
    {
        self.register_arc(name, Arc::new(procedure), data)
    }

    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        procedure: Arc<dyn Procedure>,
        data: Option<ProcedureData>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.entries.push(RegisteredProcedure {
            name,
            procedure,
            data,
        });
        Ok(())
    }

    /// Remove the first procedure registered under `name`, keeping the
    /// relative order of the rest
    pub fn deregister(&mut self, name: &str) -> Result<(), RegistryError> {
        if self.entries.is_empty() {
            return Err(RegistryError::Empty);
        }
        let index = self
            .entries
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.entries.remove(index);
        self.entries.shrink_to_fit();
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ResolvedProcedure> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| ResolvedProcedure {
                procedure: Arc::clone(&entry.procedure),
                data: entry.data.clone(),
            })
    }

    /// Drop every entry and release the storage
    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }
}

impl std::fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &self.names())
            .finish()
    }
}
