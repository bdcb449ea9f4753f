//! Authentication and authorization failures.
//!
//! Both enums keep their detail for logs; what goes back to a client is the
//! generic [`public_message`](AuthenticationError::public_message) or the
//! required scope class, nothing more.

use mcp_protocol::JsonRpcError;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

/// Credential validation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// No credential was presented.
    #[error("no credentials presented")]
    Missing,

    /// A credential was presented but could not be parsed.
    #[error("malformed credentials: {0}")]
    Malformed(String),

    /// The credential is well-formed but not accepted.
    #[error("invalid credentials: {0}")]
    Invalid(String),

    /// The credential was valid once and has expired.
    #[error("credentials expired")]
    Expired,
}

impl AuthenticationError {
    /// Message safe to show a client. Never says why a credential failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Missing => "authentication required",
            _ => "invalid credentials",
        }
    }

    pub fn to_jsonrpc(&self) -> JsonRpcError {
        JsonRpcError::unauthorized(self.public_message())
    }
}

pub type AuthenticationResult<T> = Result<T, AuthenticationError>;

// ─────────────────────────────────────────────────────────────────────────────
// Authorization
// ─────────────────────────────────────────────────────────────────────────────

/// The caller is known but may not invoke the method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// None of the caller's scopes satisfies the method's requirement.
    /// `required` lists the acceptable scopes, space separated.
    #[error("insufficient scope, requires: {required}")]
    InsufficientScope { required: String },

    /// No requirement is configured for the method, so it is refused.
    #[error("method not permitted: {method}")]
    MethodUnknown { method: String },

    /// The policy requires an authenticated caller.
    #[error("authentication required")]
    Unauthenticated,
}

impl AuthorizationError {
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            Self::InsufficientScope { required } => JsonRpcError::forbidden("insufficient scope")
                .with_data(serde_json::json!({ "required_scope": required })),
            Self::MethodUnknown { .. } => JsonRpcError::forbidden("method not permitted"),
            Self::Unauthenticated => JsonRpcError::unauthorized("authentication required"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Method extraction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodExtractionError {
    /// Responses carry no method.
    #[error("message carries no method")]
    NoMethod,
}
