//! Client-side contract: ask, then use the answer.

use std::future::Future;

use mcp_protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

use crate::error::ClientError;

/// Request/response client over some channel.
///
/// Whether an implementation needs a correlation table is its own business;
/// callers only see `call`.
pub trait TransportClient: Send + Sync {
    /// Send one request and wait for the response with the same id.
    fn call(&self, request: JsonRpcRequest) -> impl Future<Output = Result<JsonRpcResponse, ClientError>> + Send;

    /// Fire-and-forget notification.
    fn notify(&self, notification: JsonRpcNotification) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Whether `call` can currently be accepted.
    fn is_ready(&self) -> bool;

    /// Release the channel. Later calls fail with `NotReady`.
    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Check that `response` answers `request`.
///
/// Error responses with a null id are accepted: the peer could not read
/// the id (for example a 401 raised before decoding).
pub(crate) fn check_response_id(request: &JsonRpcRequest, response: &JsonRpcResponse) -> Result<(), ClientError> {
    match &response.id {
        Some(id) if *id == request.id => Ok(()),
        None if response.is_error() => Ok(()),
        Some(id) => Err(ClientError::InvalidResponse(format!(
            "response id {id} does not match request id {}",
            request.id
        ))),
        None => Err(ClientError::InvalidResponse("success response without id".into())),
    }
}
