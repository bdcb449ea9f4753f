//! Streamable HTTP: an Axum server transport and a reqwest client.

mod client;
mod request;
mod response;
mod server;
mod session;

pub use client::{HttpClient, HttpClientConfig, HttpCredentials};
pub use request::{HttpContext, HttpRequestData};
pub use response::{HttpRejection, SESSION_HEADER};
pub use server::{HttpTransport, HttpTransportConfig};
pub use session::{Session, SessionEvent, SessionStore};
