//! Error objects carried in JSON-RPC responses.
//!
//! Codes below -32600 come from JSON-RPC itself. MCP servers answer
//! lifecycle and access failures from the application block
//! (-32000 to -32099), which is where [`ErrorCode::is_application`] looks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Body was not JSON
    ParseError,
    /// JSON, but not a valid request (wrong version, bad id, repeated `initialize`)
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    ServerError,
    /// No or bad credentials
    Unauthorized,
    /// A call arrived before `initialize`
    ServerNotInitialized,
    /// Credentials lack the scope the method needs
    Forbidden,
    ServerShuttingDown,
    /// No response within the caller's deadline
    RequestTimeout,

    /// Anything else a peer sends us
    Custom(i32),
}

const KNOWN_CODES: [(ErrorCode, i32); 11] = [
    (ErrorCode::ParseError, -32700),
    (ErrorCode::InvalidRequest, -32600),
    (ErrorCode::MethodNotFound, -32601),
    (ErrorCode::InvalidParams, -32602),
    (ErrorCode::InternalError, -32603),
    (ErrorCode::ServerError, -32000),
    (ErrorCode::Unauthorized, -32001),
    (ErrorCode::ServerNotInitialized, -32002),
    (ErrorCode::Forbidden, -32003),
    (ErrorCode::ServerShuttingDown, -32004),
    (ErrorCode::RequestTimeout, -32005),
];

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::Custom(code) => *code,
            known => KNOWN_CODES
                .iter()
                .find_map(|(c, n)| (c == known).then_some(*n))
                .unwrap_or(-32603),
        }
    }

    pub fn from_code(code: i32) -> Self {
        KNOWN_CODES
            .iter()
            .find_map(|(c, n)| (*n == code).then_some(*c))
            .unwrap_or(Self::Custom(code))
    }

    pub fn is_application(&self) -> bool {
        (-32099..=-32000).contains(&self.code())
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail, e.g. the scopes a denied call was missing.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::ServerNotInitialized, "Server is not initialized")
    }

    pub fn shutting_down() -> Self {
        Self::new(ErrorCode::ServerShuttingDown, "Server is shutting down")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RequestTimeout, message)
    }

    /// Typed view of `code`; unknown numbers come back as `Custom`.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error [{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}
