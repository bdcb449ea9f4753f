//! Correlation error taxonomy.

use std::time::Duration;

use mcp_protocol::{JsonRpcError, RequestId};
use thiserror::Error;

/// Errors produced while tracking an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// A response arrived for an id that is not pending.
    #[error("no pending request with id {0}")]
    UnknownId(RequestId),

    /// The id is already registered and still pending.
    #[error("request id {0} is already pending")]
    DuplicateId(RequestId),

    /// The call was cancelled, usually because the manager shut down.
    #[error("request cancelled")]
    Cancelled,

    /// The pending-call table is full.
    #[error("too many pending requests (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// No response arrived before the deadline.
    #[error("request {id} timed out after {timeout:?}")]
    Timeout { id: RequestId, timeout: Duration },
}

impl CorrelationError {
    /// JSON-RPC error object for reporting this failure to a peer.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            Self::Timeout { .. } => JsonRpcError::timeout(self.to_string()),
            Self::Cancelled => JsonRpcError::server_error(self.to_string()),
            _ => JsonRpcError::internal(self.to_string()),
        }
    }
}

pub type CorrelationResult<T> = Result<T, CorrelationError>;
