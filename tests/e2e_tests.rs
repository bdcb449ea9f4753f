//! End-to-end tests: the router behind real transports, with access
//! control, driven by the client side of the stack.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use mcp_auth::{
    AccessControl, KeySet, OAuth2Config, OAuth2Strategy, ProtectedResourceMetadata,
    ScopeBasedPolicy, ScopeRequirements, StaticKeySet,
};
use mcp_correlation::CorrelationConfig;
use mcp_protocol::{HandlerResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, RequestId};
use mcp_server::{McpServer, Service};
use mcp_transport::{
    HttpClient, HttpClientConfig, HttpCredentials, HttpTransport, HttpTransportConfig,
    MultiplexedClient, StdioClient, StdioClientConfig, StdioTransport, Transport, TransportClient,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::io::{BufReader, duplex};

const ISSUER: &str = "https://auth.e2e.test";
const AUDIENCE: &str = "https://mcp.e2e.test";
const SECRET: &[u8] = b"e2e-signing-secret";

/// `tools` namespace with one `echo` tool and a slow variant.
struct EchoTools;

impl Service for EchoTools {
    fn namespace(&self) -> &str {
        "tools"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            "tools/list" => Ok(json!({ "tools": [{ "name": "echo" }, { "name": "slow_echo" }] })),
            "tools/call" => {
                let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
                let text = params.pointer("/arguments/text").cloned().unwrap_or(Value::Null);
                match params.get("name").and_then(Value::as_str) {
                    Some("echo") => {}
                    Some("slow_echo") => tokio::time::sleep(Duration::from_millis(150)).await,
                    other => {
                        return Err(JsonRpcError::invalid_params(format!("unknown tool: {other:?}")));
                    }
                }
                Ok(json!({ "content": [{ "type": "text", "text": text }], "isError": false }))
            }
            _ => Err(JsonRpcError::method_not_found(method)),
        }
    }
}

fn server() -> Arc<McpServer> {
    Arc::new(McpServer::default().with_service(EchoTools))
}

fn echo_call(tool: &str, text: &str) -> Option<Value> {
    Some(json!({ "name": tool, "arguments": { "text": text } }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn multiplexed_client_over_stdio_transport() {
    let (client_writer, server_reader) = duplex(8192);
    let (server_writer, client_reader) = duplex(8192);

    let mut transport = StdioTransport::with_streams(server(), BufReader::new(server_reader), server_writer);
    transport.start().await.unwrap();

    let (client, mut inbound) =
        MultiplexedClient::new(BufReader::new(client_reader), client_writer, CorrelationConfig::default());

    let early = client.request("tools/list", None).await.unwrap();
    assert_eq!(early.error_object().unwrap().code, -32002);

    let init = client
        .request("initialize", Some(json!({ "protocolVersion": "2025-03-26" })))
        .await
        .unwrap();
    assert_eq!(init.result().unwrap()["protocolVersion"], "2025-03-26");
    client
        .notify(JsonRpcNotification::new("notifications/initialized", None))
        .await
        .unwrap();

    // The slow call is answered after the fast one; both resolve.
    let (slow, fast) = tokio::join!(
        client.request("tools/call", echo_call("slow_echo", "first")),
        client.request("tools/call", echo_call("echo", "second")),
    );
    assert_eq!(slow.unwrap().result().unwrap()["content"][0]["text"], "first");
    assert_eq!(fast.unwrap().result().unwrap()["content"][0]["text"], "second");
    assert_eq!(client.pending_count(), 0);

    // Server-initiated traffic surfaces on the inbound channel.
    transport
        .send(&JsonRpcNotification::new("notifications/tools/list_changed", None).into())
        .await
        .unwrap();
    let pushed = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.method(), Some("notifications/tools/list_changed"));

    client.close().await.unwrap();
    transport.close().await.unwrap();
}

#[tokio::test]
async fn stdio_client_against_the_binary() {
    let client = StdioClient::spawn(
        env!("CARGO_BIN_EXE_mcp-core"),
        &["stdio".to_string()],
        StdioClientConfig {
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    )
    .unwrap();

    let init = client
        .call(JsonRpcRequest::new(1, "initialize", Some(json!({ "clientInfo": { "name": "e2e" } }))))
        .await
        .unwrap();
    assert_eq!(init.result().unwrap()["serverInfo"]["name"], "mcp-core");
    assert!(init.result().unwrap()["capabilities"].get("tools").is_some());

    let listed = client.call(JsonRpcRequest::new(2, "tools/list", None)).await.unwrap();
    assert_eq!(listed.result().unwrap()["tools"][0]["name"], "echo");

    let echoed = client
        .call(JsonRpcRequest::new(3, "tools/call", echo_call("echo", "over a pipe")))
        .await
        .unwrap();
    assert_eq!(echoed.result().unwrap()["content"][0]["text"], "over a pipe");

    let unknown = client
        .call(JsonRpcRequest::new(4, "tools/call", echo_call("nope", "x")))
        .await
        .unwrap();
    assert_eq!(unknown.error_object().unwrap().code, -32602);

    let missing = client.call(JsonRpcRequest::new("five", "prompts/list", None)).await.unwrap();
    assert_eq!(missing.id, Some(RequestId::String("five".into())));
    assert_eq!(missing.error_object().unwrap().code, -32601);

    client.close().await.unwrap();
    assert!(!client.is_ready());
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP with OAuth2
// ─────────────────────────────────────────────────────────────────────────────

fn mint(subject: &str, scope: &str, exp_offset: i64) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("e2e".into());
    let claims = json!({
        "sub": subject,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + exp_offset,
        "scope": scope,
    });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn start_oauth_server() -> (HttpTransport<Arc<McpServer>, OAuth2Strategy<StaticKeySet>, ScopeBasedPolicy>, String) {
    let oauth = OAuth2Config {
        algorithms: vec![Algorithm::HS256],
        leeway: Duration::ZERO,
        resource_metadata_url: Some(format!("{AUDIENCE}/.well-known/oauth-protected-resource")),
        ..OAuth2Config::new(ISSUER, AUDIENCE)
    };
    let requirements = ScopeRequirements::mcp_defaults();
    let metadata = ProtectedResourceMetadata::from_config(&oauth, &requirements);
    let keys = StaticKeySet::new(KeySet::new().with_key("e2e", DecodingKey::from_secret(SECRET)));
    let access = AccessControl::new(
        OAuth2Strategy::new(oauth, keys).unwrap(),
        ScopeBasedPolicy::new(requirements),
    );

    let config = HttpTransportConfig {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        resource_metadata: Some(metadata),
        ..Default::default()
    };
    let server = server();
    server.start().await.unwrap();
    let mut transport = HttpTransport::with_access(config, server, access);
    transport.start().await.unwrap();
    let base = format!("http://{}", transport.local_addr().unwrap());
    (transport, base)
}

fn bearer_client(endpoint: &str, token: String) -> HttpClient {
    HttpClient::new(HttpClientConfig {
        endpoint: endpoint.to_string(),
        credentials: Some(HttpCredentials::Bearer(SecretString::from(token))),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn oauth_metadata_and_challenges() {
    let (mut transport, base) = start_oauth_server().await;
    let http = reqwest::Client::new();

    let metadata: Value = http
        .get(format!("{base}/.well-known/oauth-protected-resource"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metadata["resource"], AUDIENCE);
    assert_eq!(metadata["authorization_servers"][0], ISSUER);
    let scopes = metadata["scopes_supported"].as_array().unwrap();
    assert!(scopes.contains(&json!("mcp:tools:execute")));
    assert!(scopes.contains(&json!("mcp:*")));

    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });

    let anonymous = http.post(format!("{base}/mcp")).json(&ping).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);
    let challenge = anonymous.headers()["www-authenticate"].to_str().unwrap().to_owned();
    assert!(challenge.starts_with("Bearer"));
    assert!(challenge.contains("resource_metadata="));

    let expired = http
        .post(format!("{base}/mcp"))
        .bearer_auth(mint("late", "mcp:*", -120))
        .json(&ping)
        .send()
        .await
        .unwrap();
    assert_eq!(expired.status(), 401);
    let body: Value = expired.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["message"], "invalid credentials");

    let forged = http
        .post(format!("{base}/mcp"))
        .bearer_auth(format!("{}x", mint("forger", "mcp:*", 300)))
        .json(&ping)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);

    transport.close().await.unwrap();
}

#[tokio::test]
async fn oauth_scopes_gate_each_method() {
    let (mut transport, base) = start_oauth_server().await;
    let endpoint = format!("{base}/mcp");

    // A fully scoped client runs the whole flow.
    let operator = bearer_client(&endpoint, mint("operator", "mcp:*", 300));
    let init = operator
        .call(JsonRpcRequest::new(1, "initialize", Some(json!({ "protocolVersion": "2025-06-18" }))))
        .await
        .unwrap();
    assert!(init.is_success());
    assert!(operator.session_id().is_some());
    let echoed = operator
        .call(JsonRpcRequest::new(2, "tools/call", echo_call("echo", "authorized")))
        .await
        .unwrap();
    assert_eq!(echoed.result().unwrap()["content"][0]["text"], "authorized");

    // A narrow token may list but not execute.
    let http = reqwest::Client::new();
    let reader_token = mint("reader", "mcp:initialize mcp:tools:read", 300);
    let init = http
        .post(&endpoint)
        .bearer_auth(&reader_token)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
        .send()
        .await
        .unwrap();
    assert_eq!(init.status(), 200);
    let session = init.headers()["mcp-session-id"].to_str().unwrap().to_owned();

    let listed = http
        .post(&endpoint)
        .bearer_auth(&reader_token)
        .header("mcp-session-id", &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(listed.status(), 200);
    let body: Value = listed.json().await.unwrap();
    assert_eq!(body["result"]["tools"][0]["name"], "echo");

    let denied = http
        .post(&endpoint)
        .bearer_auth(&reader_token)
        .header("mcp-session-id", &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": echo_call("echo", "no") }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    let challenge = denied.headers()["www-authenticate"].to_str().unwrap().to_owned();
    assert!(challenge.contains(r#"error="insufficient_scope""#));
    assert!(challenge.contains("mcp:tools:execute"));
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body["id"], 4);
    assert_eq!(body["error"]["code"], -32003);

    // The reader cannot use the operator's session either.
    let hijack = http
        .post(&endpoint)
        .bearer_auth(&reader_token)
        .header("mcp-session-id", operator.session_id().unwrap())
        .json(&json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(hijack.status(), 404);

    // Notifications are public once authenticated.
    let note = http
        .post(&endpoint)
        .bearer_auth(&reader_token)
        .header("mcp-session-id", &session)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .unwrap();
    assert_eq!(note.status(), 202);

    operator.close().await.unwrap();
    assert_eq!(transport.session_count(), 1);
    transport.close().await.unwrap();
}

#[tokio::test]
async fn http_clients_each_complete_the_handshake() {
    let server = server();
    server.start().await.unwrap();
    let config = HttpTransportConfig {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..Default::default()
    };
    let mut transport = HttpTransport::new(config, server.clone());
    transport.start().await.unwrap();
    let endpoint = format!("http://{}/mcp", transport.local_addr().unwrap());
    let client = || {
        HttpClient::new(HttpClientConfig {
            endpoint: endpoint.clone(),
            ..Default::default()
        })
        .unwrap()
    };
    let (first, second, late) = (client(), client(), client());

    for (n, peer) in [&first, &second].into_iter().enumerate() {
        let init = peer
            .call(JsonRpcRequest::new(1, "initialize", Some(json!({ "clientInfo": { "name": format!("peer-{n}") } }))))
            .await
            .unwrap();
        assert_eq!(init.result().unwrap()["serverInfo"]["name"], "mcp-core");
        let echoed = peer
            .call(JsonRpcRequest::new(2, "tools/call", echo_call("echo", "hi")))
            .await
            .unwrap();
        assert_eq!(echoed.result().unwrap()["content"][0]["text"], "hi");
    }
    assert_eq!(server.initialized_sessions(), 2);

    // Skipping the handshake is still refused on a fresh session.
    let skipped = late.call(JsonRpcRequest::new(1, "tools/list", None)).await.unwrap();
    assert_eq!(skipped.error_object().unwrap().code, -32002);

    // Terminating a session forgets its handshake.
    first.close().await.unwrap();
    assert_eq!(server.initialized_sessions(), 1);

    transport.close().await.unwrap();
}
