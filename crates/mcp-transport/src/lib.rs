//! MCP Transport Layer
//!
//! Server side, a [`Transport`] owns a channel and feeds every inbound
//! message to the [`MessageHandler`] it was constructed with:
//! - [`StdioTransport`]: newline-delimited JSON over stdin/stdout
//! - [`HttpTransport`]: one Axum endpoint with sessions and SSE streams,
//!   gated by an [`AccessControl`](mcp_auth::AccessControl)
//!
//! Client side, a [`TransportClient`] sends a request and returns the
//! matching response:
//! - [`StdioClient`]: strictly sequential, one line out, one line back
//! - [`MultiplexedClient`]: many concurrent calls over one duplex stream
//! - [`HttpClient`]: one POST per call

pub mod client;
pub mod error;
pub mod handler;
pub mod http;
pub mod multiplexed;
pub mod stdio;
pub mod transport;

pub use client::TransportClient;
pub use error::{ClientError, TransportError};
pub use handler::MessageHandler;
pub use http::{
    HttpClient, HttpClientConfig, HttpContext, HttpCredentials, HttpRequestData, HttpTransport,
    HttpTransportConfig,
};
pub use multiplexed::MultiplexedClient;
pub use stdio::{StdioClient, StdioClientConfig, StdioTransport};
pub use transport::{Transport, TransportState};
