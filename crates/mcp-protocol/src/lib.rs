//! MCP Protocol: JSON-RPC 2.0 envelope types
//!
//! The single source of truth for the wire format: request ids, the
//! request/response/notification union and its codec, error codes, method
//! names, and the per-message context handed from transports to handlers.

pub mod context;
pub mod error;
pub mod jsonrpc;
pub mod methods;

pub use context::MessageContext;
pub use error::{ErrorCode, JsonRpcError};
pub use jsonrpc::{
    DecodeError, HandlerResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, ResponseOutcome, JSONRPC_VERSION,
};
pub use methods::{MethodName, Methods, Notifications};
