//! HTTP rejections that carry a JSON-RPC error body.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use mcp_auth::{AuthenticationError, AuthorizationError};
use mcp_protocol::{DecodeError, JsonRpcError, JsonRpcResponse, RequestId};
use tracing::warn;

/// Header carrying the session id on requests and responses
pub const SESSION_HEADER: &str = "mcp-session-id";

/// A request the transport answers itself, before or instead of the handler.
#[derive(Debug)]
pub struct HttpRejection {
    status: StatusCode,
    id: Option<RequestId>,
    error: JsonRpcError,
    challenge: Option<String>,
}

impl HttpRejection {
    pub fn new(status: StatusCode, error: JsonRpcError) -> Self {
        Self {
            status,
            id: None,
            error,
            challenge: None,
        }
    }

    pub fn with_id(mut self, id: Option<RequestId>) -> Self {
        self.id = id;
        self
    }

    /// `WWW-Authenticate` value to send along.
    pub fn with_challenge(mut self, challenge: Option<String>) -> Self {
        self.challenge = challenge;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn unauthenticated(error: &AuthenticationError, challenge: Option<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error.to_jsonrpc()).with_challenge(challenge)
    }

    pub fn forbidden(error: &AuthorizationError, id: Option<RequestId>, challenge: Option<String>) -> Self {
        match error {
            AuthorizationError::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, error.to_jsonrpc())
                    .with_id(id)
                    .with_challenge(challenge)
            }
            AuthorizationError::InsufficientScope { required } => {
                let challenge = format!(r#"Bearer error="insufficient_scope", scope="{required}""#);
                Self::new(StatusCode::FORBIDDEN, error.to_jsonrpc())
                    .with_id(id)
                    .with_challenge(Some(challenge))
            }
            AuthorizationError::MethodUnknown { .. } => {
                Self::new(StatusCode::FORBIDDEN, error.to_jsonrpc()).with_id(id)
            }
        }
    }

    pub fn undecodable(error: &DecodeError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.to_error()).with_id(error.recoverable_id().cloned())
    }

    pub fn unknown_session(id: Option<RequestId>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            JsonRpcError::server_error("session not found"),
        )
        .with_id(id)
    }

    pub fn overloaded(message: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, JsonRpcError::server_error(message))
    }
}

impl IntoResponse for HttpRejection {
    fn into_response(self) -> Response {
        let body = JsonRpcResponse::error(self.id, self.error);
        let mut response = (self.status, Json(body)).into_response();

        if let Some(challenge) = self.challenge {
            match HeaderValue::from_str(&challenge) {
                Ok(value) => {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                }
                Err(e) => warn!(error = %e, "Unusable WWW-Authenticate value"),
            }
        }
        response
    }
}
