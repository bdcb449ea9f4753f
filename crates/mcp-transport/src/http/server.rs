//! Streamable-HTTP transport server using Axum.
//!
//! One endpoint (default `/mcp`):
//! - `POST` carries one JSON-RPC message. It is authenticated from headers,
//!   decoded, authorized on its method, bound to a session, then dispatched.
//! - `GET` opens the session's server-sent event stream.
//! - `DELETE` terminates the session.
//!
//! `/health` and the protected-resource metadata document sit beside it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mcp_auth::{
    AccessControl, AuthenticationContext, AuthenticationStrategy, AuthorizationDecision,
    AuthorizationPolicy, NoAuthentication, NoAuthorizationPolicy, ProtectedResourceMetadata,
    oauth2::PROTECTED_RESOURCE_PATH,
};
use mcp_protocol::{JsonRpcError, JsonRpcMessage, JsonRpcResponse, MessageContext};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use super::request::{HttpContext, HttpRequestData};
use super::response::{HttpRejection, SESSION_HEADER};
use super::session::{Session, SessionStore};
use crate::error::TransportError;
use crate::handler::MessageHandler;
use crate::transport::{Lifecycle, Transport, TransportState};

/// How long `close` waits for open connections to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Address to bind (port 0 for OS-assigned)
    pub bind_address: SocketAddr,
    /// Path of the MCP endpoint
    pub endpoint: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// Allowed CORS origins; empty means any
    pub allowed_origins: Vec<String>,
    /// Maximum concurrent requests plus open event streams
    pub max_connections: Option<usize>,
    /// Maximum live sessions
    pub max_sessions: Option<usize>,
    /// Events kept per session for `Last-Event-ID` replay
    pub session_history: usize,
    /// Sessions unused for this long, with no open stream, are evicted
    pub session_idle_timeout: Option<Duration>,
    /// How often idle sessions are swept
    pub session_sweep_interval: Duration,
    /// Interval of SSE keep-alive comments
    pub keep_alive: Duration,
    /// Served at `/.well-known/oauth-protected-resource` when set
    pub resource_metadata: Option<ProtectedResourceMetadata>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            endpoint: "/mcp".into(),
            enable_cors: false,
            allowed_origins: Vec::new(),
            max_connections: Some(256),
            max_sessions: Some(1024),
            session_history: 256,
            session_idle_timeout: Some(Duration::from_secs(30 * 60)),
            session_sweep_interval: Duration::from_secs(60),
            keep_alive: Duration::from_secs(15),
            resource_metadata: None,
        }
    }
}

/// Shared state for the request handlers.
struct AppState<H, S, P> {
    handler: H,
    access: AccessControl<S, P>,
    sessions: SessionStore,
    /// In-flight requests plus open event streams
    connections: Arc<AtomicUsize>,
    max_connections: Option<usize>,
    keep_alive: Duration,
    resource_metadata: Option<ProtectedResourceMetadata>,
    lifecycle: Lifecycle,
}

/// HTTP transport bound to handler `H`, authenticated by `S`, authorized by `P`.
pub struct HttpTransport<H, S = NoAuthentication, P = NoAuthorizationPolicy> {
    config: HttpTransportConfig,
    state: Arc<AppState<H, S, P>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_task: Option<JoinHandle<()>>,
    /// Idle session sweeper
    sweep_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl<H> HttpTransport<H>
where
    H: MessageHandler<HttpContext<mcp_auth::Unauthenticated>>,
{
    /// Transport with no authentication and no authorization.
    pub fn new(config: HttpTransportConfig, handler: H) -> Self {
        Self::with_access(config, handler, AccessControl::open())
    }
}

impl<H, S, P> HttpTransport<H, S, P>
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    pub fn with_access(config: HttpTransportConfig, handler: H, access: AccessControl<S, P>) -> Self {
        let state = Arc::new(AppState {
            handler,
            access,
            sessions: SessionStore::new(config.max_sessions, config.session_history)
                .with_idle_timeout(config.session_idle_timeout),
            connections: Arc::new(AtomicUsize::new(0)),
            max_connections: config.max_connections,
            keep_alive: config.keep_alive,
            resource_metadata: config.resource_metadata.clone(),
            lifecycle: Lifecycle::new(),
        });
        Self {
            config,
            state,
            shutdown_tx: None,
            server_task: None,
            sweep_task: None,
            local_addr: None,
        }
    }

    /// The bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Push a server-initiated message to one session's event stream.
    /// Returns the SSE event id.
    pub async fn send_to_session(&self, session_id: &str, message: &JsonRpcMessage) -> Result<u64, TransportError> {
        self.state.lifecycle.ensure_running()?;
        self.state.sessions.send_to(session_id, message)
    }

    /// Resolves once the transport is closed.
    pub async fn wait_closed(&self) {
        self.state.lifecycle.wait_closed().await;
    }

    /// The Axum router serving this transport.
    pub fn router(&self) -> Router {
        let app = Router::new()
            .route(
                &self.config.endpoint,
                post(handle_post::<H, S, P>)
                    .get(handle_get::<H, S, P>)
                    .delete(handle_delete::<H, S, P>),
            )
            .route("/health", get(health_handler::<H, S, P>))
            .route(PROTECTED_RESOURCE_PATH, get(metadata_handler::<H, S, P>))
            .with_state(self.state.clone());

        if self.config.enable_cors {
            app.layer(cors_layer(&self.config))
        } else {
            app
        }
    }
}

impl<H, S, P> Transport for HttpTransport<H, S, P>
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    async fn start(&mut self) -> Result<(), TransportError> {
        match self.state.lifecycle.state() {
            TransportState::Idle => {}
            TransportState::Running => return Err(TransportError::AlreadyStarted),
            TransportState::Closed => return Err(TransportError::ConnectionClosed),
        }

        let listener = tokio::net::TcpListener::bind(self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        self.state.lifecycle.start()?;

        let app = self.router();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "HTTP server failed");
            }
        });

        if self.config.session_idle_timeout.is_some() {
            let state = self.state.clone();
            let period = self.config.session_sweep_interval.max(Duration::from_millis(10));
            self.sweep_task = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    state.expire_sessions().await;
                }
            }));
        }

        info!("MCP HTTP transport listening on http://{local_addr}{}", self.config.endpoint);
        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.server_task = Some(handle);
        Ok(())
    }

    /// Broadcast to every session's event stream.
    async fn send(&self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        self.state.lifecycle.ensure_running()?;
        let delivered = self.state.sessions.broadcast(message)?;
        debug!(sessions = delivered, "Broadcast server message");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.state.lifecycle.close() {
            self.state.handler.handle_close().await;
        }
        if let Some(sweeper) = self.sweep_task.take() {
            sweeper.abort();
        }
        // Dropping the sessions ends their event streams, so the graceful
        // shutdown below is not held open by them.
        self.state.sessions.clear();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(mut handle) = self.server_task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("HTTP server did not drain in time, aborting");
                handle.abort();
            }
        }
        info!("MCP HTTP transport stopped");
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state.lifecycle.state()
    }

    fn transport_type(&self) -> &'static str {
        "http"
    }
}

impl<H, S, P> Drop for HttpTransport<H, S, P> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweep_task.take() {
            sweeper.abort();
        }
    }
}

fn cors_layer(config: &HttpTransportConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static("last-event-id"),
            HeaderName::from_static("x-api-key"),
        ])
        .expose_headers([HeaderName::from_static(SESSION_HEADER), header::WWW_AUTHENTICATE]);

    if config.allowed_origins.is_empty() || config.allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection accounting
// ─────────────────────────────────────────────────────────────────────────────

/// One counted connection; released on drop.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn acquire(counter: &Arc<AtomicUsize>, max: Option<usize>) -> Option<Self> {
        let admitted = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
            Some(max) if current >= max => None,
            _ => Some(current + 1),
        });
        match admitted {
            Ok(_) => Some(Self(counter.clone())),
            Err(current) => {
                warn!("Connection rejected: max connections reached ({current})");
                None
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

type SharedState<H, S, P> = State<Arc<AppState<H, S, P>>>;

impl<H, S, P> AppState<H, S, P>
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    fn admit(&self) -> Result<ConnectionGuard, HttpRejection> {
        if self.lifecycle.ensure_running().is_err() {
            return Err(HttpRejection::new(
                StatusCode::SERVICE_UNAVAILABLE,
                JsonRpcError::shutting_down(),
            ));
        }
        ConnectionGuard::acquire(&self.connections, self.max_connections)
            .ok_or_else(|| HttpRejection::overloaded("too many connections"))
    }

    async fn authenticate(&self, request: &HttpRequestData) -> Result<S::Context, HttpRejection> {
        self.access.authenticate(request).await.map_err(|e| {
            debug!(error = %e, path = %request.path, "Authentication failed");
            HttpRejection::unauthenticated(&e, self.access.challenge())
        })
    }

    /// Create a session, evicting idle ones first when the store is full.
    async fn open_session(&self, owner: Option<String>) -> Option<Arc<Session>> {
        if let Some(session) = self.sessions.create(owner.clone()) {
            return Some(session);
        }
        self.expire_sessions().await;
        self.sessions.create(owner)
    }

    async fn expire_sessions(&self) {
        for id in self.sessions.evict_expired() {
            self.handler.handle_session_closed(&id).await;
        }
    }

    /// The session named by the request header, if the caller owns it.
    fn existing_session(&self, headers: &HeaderMap, principal: Option<&str>) -> Result<Option<Arc<Session>>, HttpRejection> {
        let Some(value) = headers.get(SESSION_HEADER) else {
            return Ok(None);
        };
        let id = value.to_str().unwrap_or_default();
        match self.sessions.get(id) {
            Some(session) if session.is_owned_by(principal) => {
                session.touch();
                Ok(Some(session))
            }
            Some(_) => {
                warn!(session_id = %id, "Session used by a different principal");
                Err(HttpRejection::unknown_session(None))
            }
            None => Err(HttpRejection::unknown_session(None)),
        }
    }
}

fn request_data(method: Method, uri: &Uri, headers: &HeaderMap, query: HashMap<String, String>, remote: SocketAddr) -> HttpRequestData {
    HttpRequestData::new(method, uri.path(), headers, query, Some(remote))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn handle_post<H, S, P>(
    State(state): SharedState<H, S, P>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    let _guard = match state.admit() {
        Ok(guard) => guard,
        Err(rejection) => return rejection.into_response(),
    };

    // 1. Authenticate from transport credentials only.
    let request = request_data(method, &uri, &headers, query, remote);
    let auth = match state.authenticate(&request).await {
        Ok(auth) => auth,
        Err(rejection) => return rejection.into_response(),
    };

    // 2. Decode.
    let message = match JsonRpcMessage::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Undecodable request body");
            return HttpRejection::undecodable(&e).into_response();
        }
    };

    // 3. Authorize the extracted method.
    if let AuthorizationDecision::Deny { reason } = state.access.authorize(&auth, &message) {
        debug!(
            method = message.method().unwrap_or("-"),
            principal = auth.principal().unwrap_or("-"),
            error = %reason,
            "Authorization denied"
        );
        return HttpRejection::forbidden(&reason, message.id().cloned(), state.access.challenge()).into_response();
    }

    // 4. Bind to a session, creating one when none was named.
    let principal = auth.principal().map(str::to_owned);
    let session = match state.existing_session(&headers, principal.as_deref()) {
        Ok(Some(session)) => session,
        Ok(None) => match state.open_session(principal).await {
            Some(session) => session,
            None => return HttpRejection::overloaded("session limit reached").into_response(),
        },
        Err(rejection) => return rejection.with_id(message.id().cloned()).into_response(),
    };

    // 5. Dispatch.
    let request_id = match &message {
        JsonRpcMessage::Request(request) => Some(request.id.clone()),
        _ => None,
    };
    let context = MessageContext::with_session(session.id(), HttpContext::new(request, auth));
    let reply = state.handler.handle_message(message, &context).await;
    session.touch();

    let response = match (request_id, reply) {
        (Some(_), Some(reply)) => (StatusCode::OK, Json(reply)).into_response(),
        (Some(id), None) => {
            error!(request_id = %id, "Handler produced no response for a request");
            let body = JsonRpcResponse::error(Some(id), JsonRpcError::internal("no response produced"));
            (StatusCode::OK, Json(body)).into_response()
        }
        (None, reply) => {
            if let Some(reply) = reply {
                if let Err(e) = session.push(&reply) {
                    warn!(error = %e, "Failed to queue reply on session stream");
                }
            }
            StatusCode::ACCEPTED.into_response()
        }
    };
    with_session_header(response, session.id())
}

async fn handle_get<H, S, P>(
    State(state): SharedState<H, S, P>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    let guard = match state.admit() {
        Ok(guard) => guard,
        Err(rejection) => return rejection.into_response(),
    };
    let request = request_data(method, &uri, &headers, query, remote);
    let auth = match state.authenticate(&request).await {
        Ok(auth) => auth,
        Err(rejection) => return rejection.into_response(),
    };

    let session = match state.existing_session(&headers, auth.principal()) {
        Ok(Some(session)) => session,
        Ok(None) => {
            return HttpRejection::new(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request("missing Mcp-Session-Id header"),
            )
            .into_response();
        }
        Err(rejection) => return rejection.into_response(),
    };

    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let (replay, live) = session.subscribe(last_event_id);
    debug!(
        session_id = %session.id(),
        replayed = replay.len(),
        "Event stream opened"
    );

    let live = BroadcastStream::new(live).filter_map(|event| {
        std::future::ready(match event {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Event stream lagged");
                None
            }
        })
    });
    let events = stream::iter(replay).chain(live).map(move |event| {
        // The guard lives as long as the stream.
        let _ = &guard;
        Ok::<_, std::convert::Infallible>(
            Event::default()
                .id(event.id.to_string())
                .event("message")
                .data(event.data.as_ref()),
        )
    });

    let session_id = session.id().to_owned();
    // Only the live sender may keep the session alive; the stream must not.
    drop(session);

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive));
    with_session_header(sse.into_response(), &session_id)
}

async fn handle_delete<H, S, P>(
    State(state): SharedState<H, S, P>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    let _guard = match state.admit() {
        Ok(guard) => guard,
        Err(rejection) => return rejection.into_response(),
    };
    let request = request_data(method, &uri, &headers, query, remote);
    let auth = match state.authenticate(&request).await {
        Ok(auth) => auth,
        Err(rejection) => return rejection.into_response(),
    };

    match state.existing_session(&headers, auth.principal()) {
        Ok(Some(session)) => {
            state.sessions.remove(session.id());
            state.handler.handle_session_closed(session.id()).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => HttpRejection::new(
            StatusCode::BAD_REQUEST,
            JsonRpcError::invalid_request("missing Mcp-Session-Id header"),
        )
        .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn health_handler<H, S, P>(State(state): SharedState<H, S, P>) -> impl IntoResponse
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    Json(json!({
        "status": if state.lifecycle.ensure_running().is_ok() { "ok" } else { "closing" },
        "transport": "http",
        "sessions": state.sessions.len(),
        "connections": state.connections.load(Ordering::Relaxed),
    }))
}

async fn metadata_handler<H, S, P>(State(state): SharedState<H, S, P>) -> Response
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    H: MessageHandler<HttpContext<S::Context>>,
{
    match &state.resource_metadata {
        Some(metadata) => Json(metadata.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
