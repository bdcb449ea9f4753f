//! MCP Server: routes JSON-RPC requests to services.
//!
//! The server owns all services, tracks the MCP lifecycle, and is the
//! `MessageHandler` every transport is bound to.

pub mod router;
pub mod service;

pub use router::{McpServer, ServerInfo, ServerState, DEFAULT_PROTOCOL_VERSION};
pub use service::{InitResult, Service};
