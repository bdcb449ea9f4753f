//! Method extraction from the decoded payload.
//!
//! One HTTP endpoint serves every method, so the request path says nothing
//! about which method is being called. The method always comes from the
//! JSON-RPC body.

use mcp_protocol::JsonRpcMessage;

use crate::error::MethodExtractionError;

pub trait MethodExtractor: Send + Sync + 'static {
    fn extract_method<'a>(&self, message: &'a JsonRpcMessage) -> Result<&'a str, MethodExtractionError>;
}

/// Reads the `method` field of requests and notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcMethodExtractor;

impl MethodExtractor for JsonRpcMethodExtractor {
    #[inline]
    fn extract_method<'a>(&self, message: &'a JsonRpcMessage) -> Result<&'a str, MethodExtractionError> {
        message.method().ok_or(MethodExtractionError::NoMethod)
    }
}
