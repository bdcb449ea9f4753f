//! mcp-core: Model Context Protocol server
//!
//! Serves the MCP router over stdio (newline-delimited JSON on
//! stdin/stdout) or over streamable HTTP with optional API-key or OAuth2
//! bearer authentication.
//!
//! Usage:
//!   mcp-core stdio                                   # Talk over stdin/stdout
//!   mcp-core http --bind 127.0.0.1:3000              # HTTP, no auth
//!   mcp-core http --api-key secret                   # HTTP, API key
//!   mcp-core http --oauth-issuer https://issuer \
//!       --oauth-audience mcp --jwks-url https://issuer/jwks.json

mod tools;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mcp_auth::{
    AccessControl, ApiKeyContext, ApiKeyStrategy, AuthenticationStrategy, AuthorizationPolicy,
    BinaryAuthorizationPolicy, InMemoryApiKeyValidator, JwksCache, OAuth2Config, OAuth2Strategy,
    ProtectedResourceMetadata, ScopeBasedPolicy, ScopeRequirements,
    oauth2::PROTECTED_RESOURCE_PATH,
};
use mcp_server::{McpServer, ServerInfo};
use mcp_transport::{HttpContext, HttpTransport, HttpTransportConfig, MessageHandler, StdioTransport, Transport};
use secrecy::SecretString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::tools::EchoTools;

#[derive(Parser, Debug)]
#[command(name = "mcp-core", about = "Model Context Protocol server", version)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve over stdin/stdout
    Stdio,
    /// Serve over streamable HTTP
    Http(HttpArgs),
}

#[derive(Args, Debug)]
struct HttpArgs {
    /// Address to bind (port 0 for OS-assigned)
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Path of the MCP endpoint
    #[arg(long, default_value = "/mcp")]
    endpoint: String,

    /// Maximum concurrent requests plus open event streams
    #[arg(long, default_value = "256")]
    max_connections: usize,

    /// Maximum live sessions
    #[arg(long, default_value = "1024")]
    max_sessions: usize,

    /// Seconds a session may sit unused before it is evicted (0 keeps it forever)
    #[arg(long, default_value = "1800")]
    session_idle_secs: u64,

    /// Enable CORS
    #[arg(long)]
    cors: bool,

    /// Allowed CORS origin (repeatable; any origin when omitted)
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// Require this API key (x-api-key header or bearer token)
    #[arg(long, env = "MCP_API_KEY", hide_env_values = true, conflicts_with = "oauth_issuer")]
    api_key: Option<String>,

    /// Require bearer JWTs from this issuer
    #[arg(long, env = "MCP_OAUTH_ISSUER", requires_all = ["oauth_audience", "jwks_url"])]
    oauth_issuer: Option<String>,

    /// Expected `aud` claim
    #[arg(long, env = "MCP_OAUTH_AUDIENCE")]
    oauth_audience: Option<String>,

    /// Where the issuer publishes its signing keys
    #[arg(long, env = "MCP_JWKS_URL")]
    jwks_url: Option<String>,

    /// Public URL of this server, advertised in protected-resource metadata
    #[arg(long, env = "MCP_RESOURCE_URL")]
    resource_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let server = McpServer::new(ServerInfo::default()).with_service(EchoTools);
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("service initialization failed: {e}"))?;
    let server = Arc::new(server);

    match cli.command {
        Command::Stdio => serve_stdio(server.clone()).await?,
        Command::Http(args) => serve_http_with_auth(server.clone(), args).await?,
    }

    server.shutdown().await;
    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout belongs to the protocol in stdio mode, so logs always go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve_stdio(server: Arc<McpServer>) -> anyhow::Result<()> {
    let mut transport = StdioTransport::new(server);
    transport.start().await.context("failed to start stdio transport")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = transport.wait_closed() => info!("stdin closed"),
    }

    transport.close().await?;
    Ok(())
}

async fn serve_http_with_auth(server: Arc<McpServer>, args: HttpArgs) -> anyhow::Result<()> {
    let mut config = HttpTransportConfig {
        bind_address: args.bind,
        endpoint: args.endpoint.clone(),
        enable_cors: args.cors,
        allowed_origins: args.allowed_origins.clone(),
        max_connections: Some(args.max_connections),
        max_sessions: Some(args.max_sessions),
        session_idle_timeout: (args.session_idle_secs > 0).then(|| Duration::from_secs(args.session_idle_secs)),
        ..Default::default()
    };

    if let Some(key) = &args.api_key {
        info!("API key authentication enabled");
        let validator = InMemoryApiKeyValidator::new()
            .with_key(&SecretString::from(key.clone()), ApiKeyContext::new("cli"));
        let access = AccessControl::new(ApiKeyStrategy::new(validator), BinaryAuthorizationPolicy);
        return serve_http(server, config, access).await;
    }

    if let Some(issuer) = &args.oauth_issuer {
        let audience = args
            .oauth_audience
            .clone()
            .context("--oauth-audience is required with --oauth-issuer")?;
        let resource = args
            .resource_url
            .clone()
            .unwrap_or_else(|| format!("http://{}{}", args.bind, args.endpoint));

        let mut oauth = OAuth2Config::new(issuer.clone(), audience);
        oauth.jwks_url = args.jwks_url.clone();
        oauth.resource_metadata_url = Some(format!("{}{PROTECTED_RESOURCE_PATH}", origin_of(&resource)));

        let requirements = ScopeRequirements::mcp_defaults();
        let mut metadata = ProtectedResourceMetadata::from_config(&oauth, &requirements);
        metadata.resource = resource;
        config.resource_metadata = Some(metadata);

        let keys = JwksCache::from_config(&oauth)?;
        keys.refresh().await.context("initial JWKS fetch failed")?;
        let strategy = OAuth2Strategy::new(oauth, keys)?;
        info!(issuer = %issuer, "OAuth2 bearer authentication enabled");

        let access = AccessControl::new(strategy, ScopeBasedPolicy::new(requirements));
        return serve_http(server, config, access).await;
    }

    serve_http(server, config, AccessControl::open()).await
}

async fn serve_http<S, P>(server: Arc<McpServer>, config: HttpTransportConfig, access: AccessControl<S, P>) -> anyhow::Result<()>
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    Arc<McpServer>: MessageHandler<HttpContext<S::Context>>,
{
    let mut transport = HttpTransport::with_access(config, server, access);
    transport.start().await.context("failed to start HTTP transport")?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted");

    transport.close().await?;
    Ok(())
}

/// `scheme://host[:port]` of a URL, for building well-known URLs.
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}
