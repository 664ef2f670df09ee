use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::error::JsonRpcError;
use crate::types::{JsonRpcVersion, RequestId};

/// Envelope sent when a response cannot be encoded
pub const STATIC_INTERNAL_ERROR: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal Error"}}"#;

/// A successful JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub result: Value,
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    pub fn new(id: Option<RequestId>, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            result,
            id,
        }
    }

    pub fn null(id: Option<RequestId>) -> Self {
        Self::new(id, Value::Null)
    }
}

impl<T> From<(Option<RequestId>, T)> for JsonRpcResponse
where
    T: Into<Value>,
{
    fn from((id, result): (Option<RequestId>, T)) -> Self {
        Self::new(id, result.into())
    }
}

/// Union type that represents either a successful response or an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Successful response with result field
    Response(JsonRpcResponse),
    /// Error response with error field
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self::Response(JsonRpcResponse::new(id, result))
    }

    pub fn error(error: JsonRpcError) -> Self {
        Self::Error(error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcMessage::Error(_))
    }

    /// The id echoed back to the client; `None` is sent as `null`
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Response(resp) => resp.id.as_ref(),
            JsonRpcMessage::Error(err) => err.id.as_ref(),
        }
    }

    /// Encode as compact JSON terminated by a single newline.
    ///
    /// Falls back to [`STATIC_INTERNAL_ERROR`] if serialization fails.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Failed to encode JSON-RPC response: {}", err);
                STATIC_INTERNAL_ERROR.as_bytes().to_vec()
            }
        };
        line.push(b'\n');
        line
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JsonRpcErrorObject, ProcedureError};
    use serde_json::json;

    fn line(message: &JsonRpcMessage) -> String {
        String::from_utf8(message.to_line()).unwrap()
    }

    #[test]
    fn test_success_envelope_layout() {
        let message = JsonRpcMessage::success(Some(RequestId::from(1)), json!("Hello World!\n"));
        assert_eq!(
            line(&message),
            "{\"jsonrpc\":\"2.0\",\"result\":\"Hello World!\\n\",\"id\":1}\n"
        );
    }

    #[test]
    fn test_absent_result_and_id_become_null() {
        let message: JsonRpcMessage = JsonRpcResponse::null(None).into();
        assert_eq!(line(&message), "{\"jsonrpc\":\"2.0\",\"result\":null,\"id\":null}\n");
    }

    #[test]
    fn test_error_envelope_layout() {
        let error = JsonRpcError::new(
            Some(RequestId::from("req-2")),
            ProcedureError::new(-1, "Missing name parameter!").into(),
        );
        assert_eq!(
            line(&JsonRpcMessage::error(error)),
            "{\"jsonrpc\":\"2.0\",\"error\":{\"code\":-1,\"message\":\"Missing name parameter!\",\"data\":null},\"id\":\"req-2\"}\n"
        );
    }

    #[test]
    fn test_error_data_is_preserved_in_order() {
        let object = JsonRpcErrorObject {
            code: -32000,
            message: "busy".to_string(),
            data: Some(json!({"z": 1, "a": 2})),
        };
        let message = JsonRpcMessage::error(JsonRpcError::new(None, object));
        assert!(line(&message).contains("\"data\":{\"z\":1,\"a\":2}"));
        assert!(message.is_error());
        assert_eq!(message.id(), None);
    }

    #[test]
    fn test_response_from_tuple() {
        let response: JsonRpcResponse = (Some(RequestId::from(1)), json!({"test": true})).into();
        assert_eq!(response.id, Some(RequestId::from(1)));
        assert_eq!(response.result, json!({"test": true}));
    }

    #[test]
    fn test_static_fallback_is_valid_json() {
        let value: Value = serde_json::from_str(STATIC_INTERNAL_ERROR).unwrap();
        assert_eq!(value["error"]["code"], json!(-32603));
    }
}
