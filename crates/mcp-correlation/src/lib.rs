//! MCP Correlation: matches responses to the requests that caused them
//!
//! A concurrent table of in-flight requests keyed by [`RequestId`](mcp_protocol::RequestId).
//! Each registration yields a [`PendingHandle`] that completes exactly once:
//! with the peer's response, a timeout, or a cancellation.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{CorrelationError, CorrelationResult};
pub use manager::{CorrelationManager, PendingHandle};
pub use types::{CallResult, CorrelationConfig, RequestIdGenerator, StatsSnapshot};
