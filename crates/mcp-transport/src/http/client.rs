//! HTTP client: one POST per call against a streamable-HTTP endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mcp_protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::response::SESSION_HEADER;
use crate::client::{TransportClient, check_response_id};
use crate::error::ClientError;

/// Credentials attached to every request.
#[derive(Debug, Clone)]
pub enum HttpCredentials {
    /// `Authorization: Bearer <token>`
    Bearer(SecretString),
    /// Key sent in a named header
    ApiKey { header: String, key: SecretString },
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:3000/mcp`
    pub endpoint: String,
    /// Per-request deadline
    pub timeout: Duration,
    pub credentials: Option<HttpCredentials>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/mcp".into(),
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

pub struct HttpClient {
    http: reqwest::Client,
    config: HttpClientConfig,
    /// Assigned by the server on the first exchange
    session_id: RwLock<Option<String>>,
    ready: AtomicBool,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            session_id: RwLock::new(None),
            ready: AtomicBool::new(true),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, &self.config.endpoint)
            .header(ACCEPT, "application/json, text/event-stream");

        match &self.config.credentials {
            Some(HttpCredentials::Bearer(token)) => {
                builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
            }
            Some(HttpCredentials::ApiKey { header, key }) => {
                builder = builder.header(header.as_str(), key.expose_secret());
            }
            None => {}
        }
        if let Some(session_id) = self.session_id() {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        builder
    }

    async fn post(&self, message: &JsonRpcMessage) -> Result<reqwest::Response, ClientError> {
        let body = message.to_json()?;
        let response = self
            .request(reqwest::Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // The server forgot our session; the next call starts a new one.
            self.session_id.write().take();
        } else if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.write();
            if current.as_deref() != Some(id) {
                debug!(session_id = %id, "Session assigned");
                *current = Some(id.to_owned());
            }
        }
        Ok(response)
    }
}

/// Decode a body that should hold a JSON-RPC response.
fn decode_response(body: &[u8]) -> Result<JsonRpcResponse, ClientError> {
    match JsonRpcMessage::from_slice(body) {
        Ok(JsonRpcMessage::Response(response)) => Ok(response),
        Ok(_) => Err(ClientError::InvalidResponse("expected a response".into())),
        Err(e) => Err(ClientError::InvalidResponse(e.to_string())),
    }
}

impl TransportClient for HttpClient {
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        let response = self.post(&JsonRpcMessage::Request(request.clone())).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            let response = decode_response(&body)?;
            check_response_id(&request, &response)?;
            return Ok(response);
        }

        // Rejections (401, 403, 400, 404, 503) carry a JSON-RPC error body.
        match decode_response(&body) {
            Ok(response) if response.is_error() => {
                debug!(%status, request_id = %request.id, "Call rejected by server");
                check_response_id(&request, &response)?;
                Ok(response)
            }
            _ => Err(ClientError::Http(format!("unexpected status {status}"))),
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        let response = self.post(&notification.into()).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Http(format!("notification rejected with status {status}")))
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.ready.store(false, Ordering::Release);
        if self.session_id().is_none() {
            return Ok(());
        }
        // Best effort: the server evicts idle sessions anyway.
        match self.request(reqwest::Method::DELETE).send().await {
            Ok(response) => debug!(status = %response.status(), "Session terminated"),
            Err(e) => warn!(error = %e, "Failed to terminate session"),
        }
        self.session_id.write().take();
        Ok(())
    }
}
