//! Newline-delimited JSON over a pair of byte streams.

mod client;
mod transport;

pub use client::{StdioClient, StdioClientConfig};
pub use transport::StdioTransport;
