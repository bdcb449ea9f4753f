//! MCP Server Router: dispatches JSON-RPC requests to services.
//!
//! Over a pipe there is one client and `initialize` happens once. Over HTTP
//! every session runs its own handshake and may only make calls after it.

use std::collections::HashSet;

use mcp_protocol::{
    ErrorCode, HandlerResult, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcResponse,
    MessageContext, Methods, Notifications, methods::namespace_of,
};
use mcp_transport::{MessageHandler, TransportError};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::service::{InitResult, Service, ServiceDyn};

/// Protocol revision answered when the client does not ask for one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for the client's `initialize`
    Uninitialized,
    Running,
    Shutdown,
}

/// Identity reported in the `initialize` result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "mcp-core".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// The MCP Server: owns services and routes requests.
pub struct McpServer {
    info: ServerInfo,
    instructions: Option<String>,
    /// Registered services (boxed for object safety)
    services: Vec<Box<dyn ServiceDyn>>,
    state: RwLock<ServerState>,
    /// Sessions that completed `initialize`
    sessions: RwLock<HashSet<String>>,
}

impl McpServer {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            instructions: None,
            services: Vec::new(),
            state: RwLock::new(ServerState::Uninitialized),
            sessions: RwLock::new(HashSet::new()),
        }
    }

    /// Register a service with the server.
    pub fn register_service<S: Service>(&mut self, service: S) {
        info!("Registering service: {}", service.namespace());
        self.services.push(Box::new(service));
    }

    pub fn with_service<S: Service>(mut self, service: S) -> Self {
        self.register_service(service);
        self
    }

    /// Free-form usage hints returned from `initialize`.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Number of sessions that have completed `initialize`.
    pub fn initialized_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Forget a session's handshake. Returns whether it had one.
    pub fn end_session(&self, session_id: &str) -> bool {
        let ended = self.sessions.write().remove(session_id);
        if ended {
            debug!(session_id, "Session ended");
        }
        ended
    }

    /// Namespaces of the registered services, in registration order.
    pub fn namespaces(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.namespace_dyn()).collect()
    }

    /// Initialize all services. Call once before binding a transport.
    pub async fn start(&self) -> InitResult {
        for service in &self.services {
            service.init_dyn().await?;
        }
        info!(
            services = self.services.len(),
            "MCP server ready, waiting for initialize"
        );
        Ok(())
    }

    /// Shutdown all services. Later requests fail with "shutting down".
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == ServerState::Shutdown {
                return;
            }
            *state = ServerState::Shutdown;
        }

        info!("Shutting down MCP server...");
        for service in &self.services {
            service.shutdown_dyn().await;
        }
        info!("MCP server shutdown complete");
    }

    /// Handle one request from the single client of a pipe.
    pub async fn handle_request(&self, method: &str, params: Option<Value>) -> HandlerResult {
        self.handle_session_request(None, method, params).await
    }

    /// Handle one request: built-in methods first, then the owning service.
    /// With a session id, the lifecycle is tracked per session.
    pub async fn handle_session_request(&self, session: Option<&str>, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            Methods::PING => return Ok(json!("pong")),
            Methods::INITIALIZE => return self.initialize(session, params),
            _ => {}
        }

        match self.state() {
            ServerState::Shutdown => return Err(JsonRpcError::shutting_down()),
            ServerState::Uninitialized => return Err(JsonRpcError::not_initialized()),
            ServerState::Running => {}
        }
        if let Some(id) = session {
            if !self.sessions.read().contains(id) {
                return Err(JsonRpcError::not_initialized());
            }
        }

        self.route_request(method, params).await
    }

    fn initialize(&self, session: Option<&str>, params: Option<Value>) -> HandlerResult {
        {
            let mut state = self.state.write();
            if *state == ServerState::Shutdown {
                return Err(JsonRpcError::shutting_down());
            }
            match session {
                Some(id) => {
                    if !self.sessions.write().insert(id.to_owned()) {
                        return Err(JsonRpcError::invalid_request("session already initialized"));
                    }
                }
                None if *state == ServerState::Running => {
                    return Err(JsonRpcError::invalid_request("server already initialized"));
                }
                None => {}
            }
            *state = ServerState::Running;
        }

        let protocol_version = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        let client = params
            .as_ref()
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client, protocol_version, session = session.unwrap_or("-"), "Client initialized");

        let mut result = json!({
            "protocolVersion": protocol_version,
            "serverInfo": self.info,
            "capabilities": self.capabilities(),
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        Ok(result)
    }

    /// Capabilities advertised for the registered namespaces.
    fn capabilities(&self) -> Value {
        let mut capabilities = Map::new();
        for namespace in self.namespaces() {
            let key = match namespace {
                "tools" | "resources" | "prompts" | "logging" => namespace,
                "completion" => "completions",
                _ => continue,
            };
            capabilities.insert(key.to_owned(), json!({}));
        }
        Value::Object(capabilities)
    }

    /// Route a request to the appropriate service.
    async fn route_request(&self, method: &str, params: Option<Value>) -> HandlerResult {
        let namespace = namespace_of(method);

        // First: exact namespace match
        for service in &self.services {
            if service.namespace_dyn() == namespace {
                return service.handle_dyn(method, params).await;
            }
        }

        // Fallback: services that answer more than one namespace
        for service in &self.services {
            match service.handle_dyn(method, params.clone()).await {
                Err(e) if e.error_code() == ErrorCode::MethodNotFound => continue,
                result => return result,
            }
        }

        Err(JsonRpcError::method_not_found(method))
    }

    fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            Notifications::INITIALIZED => debug!("Client finished initialization"),
            Notifications::CANCELLED => {
                let request_id = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                debug!(%request_id, "Client cancelled a request");
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new(ServerInfo::default())
    }
}

impl<T> MessageHandler<T> for McpServer
where
    T: Send + Sync + 'static,
{
    async fn handle_message(&self, message: JsonRpcMessage, context: &MessageContext<T>) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => {
                debug!(
                    method = %request.method,
                    request_id = %request.id,
                    session_id = context.session_id().unwrap_or("-"),
                    "Request"
                );
                let result = self
                    .handle_session_request(context.session_id(), &request.method, request.params)
                    .await;
                if let Err(e) = &result {
                    debug!(method = %request.method, code = e.code, "Request failed");
                }
                Some(JsonRpcResponse::from_result(request.id, result).into())
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification);
                None
            }
            JsonRpcMessage::Response(response) => {
                debug!(request_id = ?response.id, "Ignoring unsolicited response");
                None
            }
        }
    }

    async fn handle_error(&self, error: TransportError) {
        warn!(error = %error, "Transport error");
    }

    async fn handle_session_closed(&self, session_id: &str) {
        self.end_session(session_id);
    }

    async fn handle_close(&self) {
        info!("Transport closed");
    }
}
