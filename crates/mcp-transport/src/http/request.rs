//! What a handler learns about the HTTP request that carried its message.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::{HeaderMap, Method};
use mcp_auth::CredentialSource;

/// Credential-relevant view of one HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequestData {
    pub method: Method,
    pub path: String,
    /// Header names are lowercased; repeated headers keep the first value
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
}

impl HttpRequestData {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let mut flat = HashMap::with_capacity(headers.len());
        for (name, value) in headers {
            // Non-UTF-8 values cannot be credentials.
            if let Ok(value) = value.to_str() {
                flat.entry(name.as_str().to_owned())
                    .or_insert_with(|| value.to_owned());
            }
        }
        Self {
            method,
            path: path.into(),
            headers: flat,
            query,
            remote_addr,
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }
}

impl CredentialSource for HttpRequestData {
    fn header(&self, name: &str) -> Option<&str> {
        match self.headers.get(name) {
            Some(value) => Some(value.as_str()),
            None => self
                .headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str),
        }
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Transport payload of every message the HTTP transport dispatches: the
/// request plus the authentication context it produced.
#[derive(Debug, Clone)]
pub struct HttpContext<C> {
    pub request: HttpRequestData,
    pub auth: C,
}

impl<C> HttpContext<C> {
    pub fn new(request: HttpRequestData, auth: C) -> Self {
        Self { request, auth }
    }
}
