//! JSON-RPC 2.0 envelope: requests, responses, notifications, and the codec
//! that turns raw bytes into one of them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::JsonRpcError;

/// The only protocol version this codec accepts.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID: either a string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outcome carried by a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    Result(Value),
    Error(JsonRpcError),
}

/// JSON-RPC 2.0 response (success or error).
///
/// `id` is `None` only for errors raised before the request id could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

/// JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Any single JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// Result from a method handler.
pub type HandlerResult = Result<Value, JsonRpcError>;

/// Why an inbound payload could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not JSON at all.
    #[error("parse error: {0}")]
    Parse(String),
    /// The payload is JSON but not a JSON-RPC 2.0 message.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        id: Option<RequestId>,
        reason: String,
    },
}

impl DecodeError {
    fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            id,
            reason: reason.into(),
        }
    }

    /// The request id, if one could be read before decoding failed.
    pub fn recoverable_id(&self) -> Option<&RequestId> {
        match self {
            Self::Parse(_) => None,
            Self::InvalidRequest { id, .. } => id.as_ref(),
        }
    }

    /// The JSON-RPC error object (-32700 or -32600) describing this failure.
    pub fn to_error(&self) -> JsonRpcError {
        match self {
            Self::Parse(_) => JsonRpcError::parse_error("Parse error"),
            Self::InvalidRequest { reason, .. } => JsonRpcError::invalid_request(reason.clone()),
        }
    }

    /// An error response addressed to the recovered id (or `null`).
    pub fn to_response(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.recoverable_id().cloned(), self.to_error())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper constructors
// ─────────────────────────────────────────────────────────────────────────────

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Validate that this is a well-formed JSON-RPC 2.0 request.
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION && !self.method.is_empty()
    }
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            outcome: ResponseOutcome::Result(result),
        }
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            outcome: ResponseOutcome::Error(error),
        }
    }

    /// Build a response for `id` from a handler result.
    pub fn from_result(id: RequestId, result: HandlerResult) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::error(Some(id), error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Error(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Result(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(v) => Some(v),
            ResponseOutcome::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.outcome {
            ResponseOutcome::Result(_) => None,
            ResponseOutcome::Error(e) => Some(e),
        }
    }

    pub fn into_result(self) -> HandlerResult {
        match self.outcome {
            ResponseOutcome::Result(v) => Ok(v),
            ResponseOutcome::Error(e) => Err(e),
        }
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        Self::Request(r)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

impl JsonRpcMessage {
    /// Decode a single message from text.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a single message from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            Value::Array(_) => {
                return Err(DecodeError::invalid(None, "Batch requests are not supported"));
            }
            _ => return Err(DecodeError::invalid(None, "Expected a JSON object")),
        };

        let id = read_id(&obj)?;

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(DecodeError::invalid(id, "Invalid JSON-RPC 2.0 request"));
        }

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(DecodeError::invalid(id, "Method must be a string"));
            };
            if method.is_empty() {
                return Err(DecodeError::invalid(id, "Method must not be empty"));
            }
            let params = match obj.remove("params") {
                None => None,
                Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
                Some(_) => {
                    return Err(DecodeError::invalid(id, "Params must be an object or array"));
                }
            };
            return match (obj.contains_key("id"), id) {
                (false, _) => Ok(Self::Notification(JsonRpcNotification {
                    jsonrpc: JSONRPC_VERSION.into(),
                    method,
                    params,
                })),
                (true, Some(id)) => Ok(Self::Request(JsonRpcRequest {
                    jsonrpc: JSONRPC_VERSION.into(),
                    id,
                    method,
                    params,
                })),
                (true, None) => Err(DecodeError::invalid(None, "Request id must not be null")),
            };
        }

        let outcome = match (obj.remove("result"), obj.remove("error")) {
            (Some(result), None) => {
                if id.is_none() {
                    return Err(DecodeError::invalid(None, "Successful response requires an id"));
                }
                ResponseOutcome::Result(result)
            }
            (None, Some(error)) => {
                let error: JsonRpcError = serde_json::from_value(error)
                    .map_err(|_| DecodeError::invalid(id.clone(), "Malformed error object"))?;
                ResponseOutcome::Error(error)
            }
            (Some(_), Some(_)) => {
                return Err(DecodeError::invalid(id, "Response carries both result and error"));
            }
            (None, None) => {
                return Err(DecodeError::invalid(id, "Message has no method, result, or error"));
            }
        };

        if !obj.contains_key("id") {
            return Err(DecodeError::invalid(None, "Response requires an id"));
        }

        Ok(Self::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            outcome,
        }))
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize as one newline-terminated line for pipe transports.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = self.to_json()?;
        line.push('\n');
        Ok(line)
    }

    /// The method name of a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// The id of a request or response.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => r.id.as_ref(),
            Self::Notification(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}

/// Read the `id` member. Absent or `null` yields `None`; any other
/// non-string, non-integer value is rejected.
fn read_id(obj: &Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| DecodeError::invalid(None, "Request id must be an integer or string")),
        Some(_) => Err(DecodeError::invalid(
            None,
            "Request id must be an integer or string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request_response_notification() {
        let req = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(req.is_request());
        assert_eq!(req.id(), Some(&RequestId::Number(1)));

        let note = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap();
        assert!(note.is_notification());
        assert_eq!(note.method(), Some("notifications/initialized"));

        let resp = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":"a","result":"pong"}"#).unwrap();
        match resp {
            JsonRpcMessage::Response(r) => {
                assert_eq!(r.id, Some(RequestId::String("a".into())));
                assert_eq!(r.result(), Some(&json!("pong")));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn syntax_error_has_no_recoverable_id() {
        let err = JsonRpcMessage::parse("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Parse(_)));
        assert!(err.recoverable_id().is_none());
        assert_eq!(err.to_error().code, -32700);
    }

    #[test]
    fn wrong_version_keeps_id() {
        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"1.0","id":7,"method":"x"}"#).unwrap_err();
        assert_eq!(err.recoverable_id(), Some(&RequestId::Number(7)));
        let resp = err.to_response();
        assert_eq!(resp.id, Some(RequestId::Number(7)));
        assert_eq!(resp.error_object().unwrap().code, -32600);
    }

    #[test]
    fn batch_is_rejected() {
        let err = JsonRpcMessage::parse(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRequest { id: None, .. }));
    }

    #[test]
    fn response_with_both_result_and_error_is_invalid() {
        let err = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":3,"result":1,"error":{"code":-1,"message":"x"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.recoverable_id(), Some(&RequestId::Number(3)));
    }

    #[test]
    fn error_response_may_have_null_id() {
        let msg = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        )
        .unwrap();
        match msg {
            JsonRpcMessage::Response(r) => {
                assert!(r.id.is_none());
                assert!(r.is_error());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn scalar_params_are_invalid() {
        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":2,"method":"x","params":5}"#)
            .unwrap_err();
        assert_eq!(err.recoverable_id(), Some(&RequestId::Number(2)));
    }

    #[test]
    fn serializes_response_without_other_member() {
        let resp = JsonRpcResponse::success(RequestId::Number(1), json!("pong"));
        let v = serde_json::to_value(JsonRpcMessage::from(resp)).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 1, "result": "pong"}));
    }
}
