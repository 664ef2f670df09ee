use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{JsonRpcVersion, RequestId};

/// Parameters for a JSON-RPC request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    /// Positional parameters as an array
    Array(Vec<Value>),
    /// Named parameters as an object
    Object(Map<String, Value>),
}

impl RequestParams {
    /// Get a parameter by name (for object params)
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            RequestParams::Object(map) => map.get(key),
            RequestParams::Array(_) => None,
        }
    }

    /// Get a parameter by index (for array params only)
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            RequestParams::Array(vec) => vec.get(index),
            RequestParams::Object(_) => None,
        }
    }

    /// Check if parameters are empty
    pub fn is_empty(&self) -> bool {
        match self {
            RequestParams::Object(map) => map.is_empty(),
            RequestParams::Array(vec) => vec.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RequestParams::Object(map) => map.len(),
            RequestParams::Array(vec) => vec.len(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestParams::Object(map) => Value::Object(map.clone()),
            RequestParams::Array(arr) => Value::Array(arr.clone()),
        }
    }
}

impl From<Vec<Value>> for RequestParams {
    fn from(vec: Vec<Value>) -> Self {
        RequestParams::Array(vec)
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        RequestParams::Object(map)
    }
}

/// A JSON object that cannot be served as a request.
///
/// Carries whatever id could be recovered so the error envelope can still
/// be correlated by the client.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid request: {reason}")]
pub struct InvalidRequest {
    pub id: Option<RequestId>,
    pub reason: &'static str,
}

/// A JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    pub params: RequestParams,
    pub id: Option<RequestId>,
}

impl JsonRpcRequest {
    pub fn new(id: Option<RequestId>, method: impl Into<String>, params: RequestParams) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params,
            id,
        }
    }

    /// Validate a framed JSON object as a request.
    ///
    /// All four members are required: `jsonrpc` must be `"2.0"`, `method`
    /// a non-empty string, `params` an array or object, and `id` a string,
    /// number or null.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, InvalidRequest> {
        let id = match object.get("id") {
            None => {
                return Err(InvalidRequest {
                    id: None,
                    reason: "missing id",
                });
            }
            Some(raw) => RequestId::from_value(raw).map_err(|()| InvalidRequest {
                id: None,
                reason: "id must be a string, number or null",
            })?,
        };
        let reject = |reason| InvalidRequest {
            id: id.clone(),
            reason,
        };

        match object.get("jsonrpc") {
            Some(Value::String(version)) if version == crate::JSONRPC_VERSION => {}
            Some(_) => return Err(reject("unsupported jsonrpc version")),
            None => return Err(reject("missing jsonrpc version")),
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            Some(Value::String(_)) => return Err(reject("empty method")),
            Some(_) => return Err(reject("method must be a string")),
            None => return Err(reject("missing method")),
        };

        let params = match object.remove("params") {
            Some(Value::Array(params)) => RequestParams::Array(params),
            Some(Value::Object(params)) => RequestParams::Object(params),
            Some(_) => return Err(reject("params must be an array or object")),
            None => return Err(reject("missing params")),
        };

        Ok(Self::new(id, method, params))
    }

    /// Get a parameter by name (if params are an object)
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Get a parameter by index (if params are an array)
    pub fn get_param_index(&self, index: usize) -> Option<&Value> {
        self.params.get_index(index)
    }
}
