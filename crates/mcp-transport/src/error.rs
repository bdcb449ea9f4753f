//! Transport and client error taxonomy.

use std::time::Duration;

use mcp_correlation::CorrelationError;
use thiserror::Error;

/// Failures on the server-side channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel is closed or was never started.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Inbound bytes that are not a JSON-RPC message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport already started")]
    AlreadyStarted,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown session: {0}")]
    UnknownSession(String),
}

/// Failures of a client `call`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    /// The client is closed or not yet connected.
    #[error("client not ready")]
    NotReady,

    #[error("connection closed")]
    ConnectionClosed,

    /// The peer answered with something that is not the matching response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Correlation(CorrelationError),
}

impl From<CorrelationError> for ClientError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::Timeout { .. } => Self::Timeout,
            CorrelationError::Cancelled => Self::ConnectionClosed,
            other => Self::Correlation(other),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ConnectionClosed
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
