//! Request validation and procedure dispatch.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::context::InvocationContext;
use crate::diagnostics::ErrorRecord;
use crate::error::{JsonRpcError, JsonRpcErrorObject};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcMessage;
use crate::server::{NonObjectPolicy, ServerHandle};

/// Resolves framed messages against the registry and produces exactly one
/// response per request
#[derive(Clone)]
pub struct Dispatcher {
    server: ServerHandle,
    non_object_messages: NonObjectPolicy,
}

impl Dispatcher {
    pub fn new(server: ServerHandle, non_object_messages: NonObjectPolicy) -> Self {
        Self {
            server,
            non_object_messages,
        }
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// Handle one complete top-level JSON value.
    ///
    /// Returns `None` when nothing should be written back, which only
    /// happens for non-object values under [`NonObjectPolicy::Ignore`].
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcMessage> {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return match self.non_object_messages {
                    NonObjectPolicy::Ignore => {
                        debug!("Ignoring non-object JSON message: {}", kind_of(&other));
                        None
                    }
                    NonObjectPolicy::Reject => {
                        Some(JsonRpcMessage::error(JsonRpcError::invalid_request(None)))
                    }
                };
            }
        };

        match JsonRpcRequest::from_object(object) {
            Ok(request) => Some(self.handle_request(request).await),
            Err(invalid) => {
                debug!("Rejecting request: {}", invalid);
                Some(JsonRpcMessage::error(JsonRpcError::invalid_request(
                    invalid.id,
                )))
            }
        }
    }

    /// Invoke the procedure named by `request` and encode its outcome
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        // Clone the entry out so the registry is not locked while the
        // procedure runs; procedures may register or deregister.
        let resolved = self.server.registry().read().find(&method);
        let Some(resolved) = resolved else {
            debug!("Method not found: {}", method);
            return JsonRpcMessage::error(JsonRpcError::method_not_found(id));
        };

        debug!("Dispatching {} (id: {:?})", method, id);
        let ctx = InvocationContext::new(method, id.clone(), resolved.data, self.server.clone());
        let outcome = AssertUnwindSafe(resolved.procedure.call(&ctx, params))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => JsonRpcMessage::success(id, result),
            Ok(Err(app_error)) => {
                debug!("Procedure {} failed: {}", ctx.method(), app_error);
                JsonRpcMessage::error(JsonRpcError::new(id, JsonRpcErrorObject::from(app_error)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Procedure {} panicked: {}", ctx.method(), message);
                self.server.record_error(ErrorRecord::new(
                    -1,
                    "procedure",
                    format!("{} panicked: {}", ctx.method(), message),
                ));
                JsonRpcMessage::error(JsonRpcError::internal_error(id, None))
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        warn!("Procedure panicked with a non-string payload");
        "unknown panic".to_string()
    }
}
