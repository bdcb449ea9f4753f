//! Transport tests: stdio framing, clients, and the HTTP endpoint.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use mcp_auth::{
        AccessControl, ApiKeyContext, ApiKeyStrategy, BinaryAuthorizationPolicy,
        InMemoryApiKeyValidator,
    };
    use mcp_correlation::{CorrelationConfig, CorrelationError};
    use mcp_protocol::{
        JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageContext,
        RequestId,
    };
    use mcp_transport::*;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, duplex};

    /// Answers every request with its method, params and session id.
    #[derive(Default)]
    struct Echo {
        errors: AtomicUsize,
        closes: AtomicUsize,
    }

    impl<T: Send + Sync + 'static> MessageHandler<T> for Echo {
        async fn handle_message(&self, message: JsonRpcMessage, context: &MessageContext<T>) -> Option<JsonRpcMessage> {
            match message {
                JsonRpcMessage::Request(request) => {
                    if request.method == "slow" {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    let result = json!({
                        "method": request.method,
                        "params": request.params,
                        "session": context.session_id(),
                    });
                    Some(JsonRpcResponse::success(request.id, result).into())
                }
                _ => None,
            }
        }

        async fn handle_error(&self, _error: TransportError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        async fn handle_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Pipes {
        server_reader: BufReader<DuplexStream>,
        server_writer: DuplexStream,
        client_reader: BufReader<DuplexStream>,
        client_writer: DuplexStream,
    }

    fn pipes() -> Pipes {
        let (client_writer, server_read) = duplex(64 * 1024);
        let (server_writer, client_read) = duplex(64 * 1024);
        Pipes {
            server_reader: BufReader::new(server_read),
            server_writer,
            client_reader: BufReader::new(client_read),
            client_writer,
        }
    }

    async fn next_message(lines: &mut Lines<BufReader<DuplexStream>>) -> JsonRpcMessage {
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("line within deadline")
            .unwrap()
            .expect("stream still open");
        JsonRpcMessage::parse(&line).unwrap()
    }

    fn response(message: JsonRpcMessage) -> JsonRpcResponse {
        match message {
            JsonRpcMessage::Response(response) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stdio transport
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stdio_replies_on_the_same_channel() {
        let p = pipes();
        let mut transport = StdioTransport::with_streams(Arc::new(Echo::default()), p.server_reader, p.server_writer);
        transport.start().await.unwrap();
        assert!(transport.is_running());
        assert_eq!(transport.transport_type(), "stdio");

        let mut writer = p.client_writer;
        let mut lines = p.client_reader.lines();
        writer
            .write_all(b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let reply = response(next_message(&mut lines).await);
        assert_eq!(reply.id, Some(RequestId::Number(1)));
        assert_eq!(reply.result().unwrap()["method"], "tools/list");
        assert_eq!(reply.result().unwrap()["session"], Value::Null);
    }

    #[tokio::test]
    async fn stdio_slow_handler_does_not_block_later_lines() {
        let p = pipes();
        let mut transport = StdioTransport::with_streams(Echo::default(), p.server_reader, p.server_writer);
        transport.start().await.unwrap();

        let mut writer = p.client_writer;
        let mut lines = p.client_reader.lines();
        writer
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"slow\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
            )
            .await
            .unwrap();

        let first = response(next_message(&mut lines).await);
        let second = response(next_message(&mut lines).await);
        assert_eq!(first.id, Some(RequestId::Number(2)));
        assert_eq!(second.id, Some(RequestId::Number(1)));
    }

    #[tokio::test]
    async fn stdio_answers_invalid_requests_and_survives_garbage() {
        let handler = Arc::new(Echo::default());
        let p = pipes();
        let mut transport = StdioTransport::with_streams(handler.clone(), p.server_reader, p.server_writer);
        transport.start().await.unwrap();

        let mut writer = p.client_writer;
        let mut lines = p.client_reader.lines();

        writer
            .write_all(b"{\"jsonrpc\":\"1.0\",\"id\":5,\"method\":\"x\"}\n")
            .await
            .unwrap();
        let reply = response(next_message(&mut lines).await);
        assert_eq!(reply.id, Some(RequestId::Number(5)));
        assert_eq!(reply.error_object().unwrap().code, -32600);

        // No id can be read from this, so nothing is written back.
        writer.write_all(b"not json at all\n").await.unwrap();
        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let reply = response(next_message(&mut lines).await);
        assert_eq!(reply.id, Some(RequestId::Number(6)));
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stdio_eof_closes_once() {
        let handler = Arc::new(Echo::default());
        let p = pipes();
        let mut transport = StdioTransport::with_streams(handler.clone(), p.server_reader, p.server_writer);
        transport.start().await.unwrap();

        drop(p.client_writer);
        tokio::time::timeout(Duration::from_secs(2), transport.wait_closed())
            .await
            .unwrap();
        assert_eq!(transport.state(), TransportState::Closed);

        transport.close().await.unwrap();
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);

        let note: JsonRpcMessage = JsonRpcNotification::new("notifications/message", None).into();
        assert!(matches!(transport.send(&note).await, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn stdio_lifecycle_rules() {
        let p = pipes();
        let mut transport = StdioTransport::with_streams(Echo::default(), p.server_reader, p.server_writer);
        let note: JsonRpcMessage = JsonRpcNotification::new("notifications/message", None).into();

        assert_eq!(transport.state(), TransportState::Idle);
        assert!(matches!(transport.send(&note).await, Err(TransportError::ConnectionClosed)));

        transport.start().await.unwrap();
        assert!(matches!(transport.start().await, Err(TransportError::AlreadyStarted)));

        let mut lines = p.client_reader.lines();
        transport.send(&note).await.unwrap();
        let received = next_message(&mut lines).await;
        assert_eq!(received.method(), Some("notifications/message"));

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(matches!(transport.start().await, Err(TransportError::ConnectionClosed)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stdio client
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stdio_client_round_trip_against_transport() {
        let p = pipes();
        let mut transport = StdioTransport::with_streams(Echo::default(), p.server_reader, p.server_writer);
        transport.start().await.unwrap();

        let client = StdioClient::with_streams(p.client_reader, p.client_writer, StdioClientConfig::default());
        let reply = client
            .call(JsonRpcRequest::new(1, "tools/call", Some(json!({ "name": "x" }))))
            .await
            .unwrap();
        assert_eq!(reply.result().unwrap()["params"]["name"], "x");

        client.close().await.unwrap();
        assert!(!client.is_ready());
        assert!(matches!(
            client.call(JsonRpcRequest::new(2, "ping", None)).await,
            Err(ClientError::NotReady)
        ));
    }

    #[tokio::test]
    async fn stdio_client_skips_responses_to_timed_out_calls() {
        let p = pipes();
        let client = StdioClient::with_streams(
            p.client_reader,
            p.client_writer,
            StdioClientConfig {
                timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );

        let mut peer_lines = p.server_reader.lines();
        let mut peer_writer = p.server_writer;

        let err = client.call(JsonRpcRequest::new(1, "ping", None)).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert!(next_message(&mut peer_lines).await.is_request());

        // The late answer to 1 arrives before the answer to 2.
        let late = JsonRpcMessage::from(JsonRpcResponse::success(RequestId::Number(1), json!("late")));
        let fresh = JsonRpcMessage::from(JsonRpcResponse::success(RequestId::Number(2), json!("fresh")));
        peer_writer.write_all(late.to_line().unwrap().as_bytes()).await.unwrap();
        peer_writer.write_all(fresh.to_line().unwrap().as_bytes()).await.unwrap();

        let reply = client.call(JsonRpcRequest::new(2, "ping", None)).await.unwrap();
        assert_eq!(reply.result(), Some(&json!("fresh")));
    }

    #[tokio::test]
    async fn stdio_client_resumes_line_torn_by_timeout() {
        let p = pipes();
        let client = StdioClient::with_streams(
            p.client_reader,
            p.client_writer,
            StdioClientConfig {
                timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );
        let mut peer_writer = p.server_writer;

        // Only the head of the answer to 1 is on the wire when the call gives up.
        peer_writer.write_all(br#"{"jsonrpc":"2.0","id":1,"#).await.unwrap();
        let err = client.call(JsonRpcRequest::new(1, "ping", None)).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));

        let fresh = JsonRpcMessage::from(JsonRpcResponse::success(RequestId::Number(2), json!("fresh")));
        peer_writer.write_all(b"\"result\":\"late\"}\n").await.unwrap();
        peer_writer.write_all(fresh.to_line().unwrap().as_bytes()).await.unwrap();

        let reply = client.call(JsonRpcRequest::new(2, "ping", None)).await.unwrap();
        assert_eq!(reply.result(), Some(&json!("fresh")));
    }

    #[tokio::test]
    async fn stdio_client_rejects_mismatched_id() {
        let p = pipes();
        let client = StdioClient::with_streams(p.client_reader, p.client_writer, StdioClientConfig::default());
        let mut peer_writer = p.server_writer;

        let wrong = JsonRpcMessage::from(JsonRpcResponse::success(RequestId::Number(99), json!(1)));
        peer_writer.write_all(wrong.to_line().unwrap().as_bytes()).await.unwrap();

        let err = client.call(JsonRpcRequest::new(1, "ping", None)).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn stdio_client_reports_closed_pipe() {
        let p = pipes();
        let client = StdioClient::with_streams(p.client_reader, p.client_writer, StdioClientConfig::default());
        drop(p.server_writer);

        let err = client.call(JsonRpcRequest::new(1, "ping", None)).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed | ClientError::Io(_)));
        assert!(!client.is_ready());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Multiplexed client
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn multiplexed_calls_complete_out_of_order() {
        let Pipes {
            server_reader,
            server_writer,
            client_reader,
            client_writer,
        } = pipes();
        let (client, mut inbound) = MultiplexedClient::new(client_reader, client_writer, CorrelationConfig::default());

        let peer = tokio::spawn(async move {
            let mut lines = server_reader.lines();
            let mut writer = server_writer;
            let mut requests = Vec::new();
            for _ in 0..2 {
                match next_message(&mut lines).await {
                    JsonRpcMessage::Request(request) => requests.push(request),
                    other => panic!("unexpected {other:?}"),
                }
            }
            // Answer in reverse order, then push a notification.
            for request in requests.into_iter().rev() {
                let reply = JsonRpcMessage::from(JsonRpcResponse::success(
                    request.id.clone(),
                    json!(request.method),
                ));
                writer.write_all(reply.to_line().unwrap().as_bytes()).await.unwrap();
            }
            let note = JsonRpcMessage::from(JsonRpcNotification::new("notifications/message", None));
            writer.write_all(note.to_line().unwrap().as_bytes()).await.unwrap();
            writer
        });

        let (a, b) = tokio::join!(client.request("tools/list", None), client.request("prompts/list", None));
        assert_eq!(a.unwrap().result(), Some(&json!("tools/list")));
        assert_eq!(b.unwrap().result(), Some(&json!("prompts/list")));
        assert_eq!(client.pending_count(), 0);

        let note = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note.method(), Some("notifications/message"));

        let _writer = peer.await.unwrap();
        client.close().await.unwrap();
        assert!(!client.is_ready());
    }

    #[tokio::test]
    async fn multiplexed_stream_end_cancels_pending_calls() {
        let p = pipes();
        let (client, _inbound) = MultiplexedClient::new(p.client_reader, p.client_writer, CorrelationConfig::default());
        let client = Arc::new(client);

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.request("ping", None).await })
        };
        // Wait for the request to hit the wire, then hang up.
        let mut lines = p.server_reader.lines();
        next_message(&mut lines).await;
        drop(p.server_writer);

        let result = tokio::time::timeout(Duration::from_secs(2), call).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(!client.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multiplexed_calls_racing_stream_end_fail_fast() {
        let p = pipes();
        let (client, _inbound) = MultiplexedClient::new(
            p.client_reader,
            p.client_writer,
            CorrelationConfig {
                default_timeout: Duration::from_secs(30),
                ..Default::default()
            },
        );
        let client = Arc::new(client);
        let _peer_reader = p.server_reader;

        let calls: Vec<_> = (0..32)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.request("ping", None).await })
            })
            .collect();
        drop(p.server_writer);

        for call in calls {
            let result = tokio::time::timeout(Duration::from_secs(2), call)
                .await
                .expect("call settled once the stream ended")
                .unwrap();
            assert!(result.is_err());
        }

        // The table is closed, not just drained.
        assert!(client.correlation().is_closed());
        assert_eq!(
            client.correlation().register(RequestId::Number(99)).unwrap_err(),
            CorrelationError::Cancelled
        );
    }

    #[tokio::test]
    async fn multiplexed_client_answers_server_requests() {
        let Pipes {
            server_reader,
            mut server_writer,
            client_reader,
            client_writer,
        } = pipes();
        let (client, mut inbound) = MultiplexedClient::new(client_reader, client_writer, CorrelationConfig::default());

        let ask = JsonRpcMessage::from(JsonRpcRequest::new(7, "sampling/createMessage", Some(json!({ "maxTokens": 16 }))));
        server_writer.write_all(ask.to_line().unwrap().as_bytes()).await.unwrap();

        let request = match tokio::time::timeout(Duration::from_secs(2), inbound.recv()).await.unwrap() {
            Some(JsonRpcMessage::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        };
        assert_eq!(request.method, "sampling/createMessage");
        client
            .respond(JsonRpcResponse::success(request.id, json!({ "content": "ok" })))
            .await
            .unwrap();

        let mut lines = server_reader.lines();
        match next_message(&mut lines).await {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.id, Some(RequestId::Number(7)));
                assert_eq!(response.result(), Some(&json!({ "content": "ok" })));
            }
            other => panic!("expected a response, got {other:?}"),
        }

        client.close().await.unwrap();
        assert!(matches!(
            client.respond(JsonRpcResponse::success(RequestId::Number(8), json!(null))).await,
            Err(ClientError::NotReady)
        ));
    }

    #[tokio::test]
    async fn multiplexed_call_times_out() {
        let p = pipes();
        let (client, _inbound) = MultiplexedClient::new(
            p.client_reader,
            p.client_writer,
            CorrelationConfig {
                default_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let _peer = (p.server_reader, p.server_writer);

        let result = client.request("ping", None).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert_eq!(client.correlation().stats().timed_out, 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // HTTP
    // ─────────────────────────────────────────────────────────────────────

    fn local_config() -> HttpTransportConfig {
        HttpTransportConfig {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        }
    }

    fn base_url(addr: SocketAddr) -> String {
        format!("http://{addr}")
    }

    async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
        let mut text = String::new();
        while !text.contains(needle) {
            let chunk = tokio::time::timeout(Duration::from_secs(2), response.chunk())
                .await
                .expect("event within deadline")
                .unwrap()
                .expect("stream still open");
            text.push_str(&String::from_utf8_lossy(&chunk));
        }
        text
    }

    #[tokio::test]
    async fn http_call_assigns_and_reuses_a_session() {
        let mut transport = HttpTransport::new(local_config(), Echo::default());
        transport.start().await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = HttpClient::new(HttpClientConfig {
            endpoint: format!("{}/mcp", base_url(addr)),
            ..Default::default()
        })
        .unwrap();

        let first = client.call(JsonRpcRequest::new(1, "initialize", None)).await.unwrap();
        let session = client.session_id().expect("session assigned");
        assert_eq!(first.result().unwrap()["session"], json!(session));

        let second = client.call(JsonRpcRequest::new(2, "tools/list", None)).await.unwrap();
        assert_eq!(second.result().unwrap()["session"], json!(session));
        assert_eq!(transport.session_count(), 1);

        client
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await
            .unwrap();

        client.close().await.unwrap();
        assert_eq!(transport.session_count(), 0);
        transport.close().await.unwrap();
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn http_status_codes() {
        let mut transport = HttpTransport::new(local_config(), Echo::default());
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));
        let http = reqwest::Client::new();

        let bad = http.post(&url).body("{not json").send().await.unwrap();
        assert_eq!(bad.status(), 400);
        let body: Value = bad.json().await.unwrap();
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);

        let invalid = http
            .post(&url)
            .body(r#"{"jsonrpc":"2.0","id":3}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), 400);
        let body: Value = invalid.json().await.unwrap();
        assert_eq!(body["error"]["code"], -32600);
        assert_eq!(body["id"], 3);

        let unknown = http
            .post(&url)
            .header("mcp-session-id", "no-such-session")
            .body(r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);

        let accepted = http
            .post(&url)
            .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), 202);
        assert!(accepted.headers().contains_key("mcp-session-id"));

        let health: Value = http
            .get(format!("{}/health", base_url(transport.local_addr().unwrap())))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 1);

        let metadata = http
            .get(format!(
                "{}/.well-known/oauth-protected-resource",
                base_url(transport.local_addr().unwrap())
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(metadata.status(), 404);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn http_event_stream_replays_and_delivers_live() {
        let mut transport = HttpTransport::new(local_config(), Echo::default());
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));

        let client = HttpClient::new(HttpClientConfig {
            endpoint: url.clone(),
            ..Default::default()
        })
        .unwrap();
        client.call(JsonRpcRequest::new(1, "initialize", None)).await.unwrap();
        let session = client.session_id().unwrap();

        let progress = |seq: &str| -> JsonRpcMessage {
            JsonRpcNotification::new("notifications/progress", Some(json!({ "seq": seq }))).into()
        };
        let first = transport.send_to_session(&session, &progress("first")).await.unwrap();
        transport.send_to_session(&session, &progress("second")).await.unwrap();

        let mut stream = reqwest::Client::new()
            .get(&url)
            .header("mcp-session-id", &session)
            .header("last-event-id", first.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(stream.status(), 200);

        let replayed = read_until(&mut stream, "second").await;
        assert!(!replayed.contains("first"));

        transport.send(&progress("third")).await.unwrap();
        read_until(&mut stream, "third").await;

        // Terminating the session ends its stream.
        client.close().await.unwrap();
        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match stream.chunk().await {
                    Ok(Some(_)) => continue,
                    _ => break,
                }
            }
        })
        .await;
        assert!(ended.is_ok());

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn http_get_requires_a_session() {
        let mut transport = HttpTransport::new(local_config(), Echo::default());
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));

        let response = reqwest::Client::new().get(&url).send().await.unwrap();
        assert_eq!(response.status(), 400);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn http_connection_cap_returns_503() {
        let mut transport = HttpTransport::new(
            HttpTransportConfig {
                max_connections: Some(1),
                ..local_config()
            },
            Echo::default(),
        );
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));
        let http = reqwest::Client::new();

        let init = http
            .post(&url)
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .send()
            .await
            .unwrap();
        let session = init.headers()["mcp-session-id"].to_str().unwrap().to_owned();

        // The open event stream holds the only slot.
        let _stream = http
            .get(&url)
            .header("mcp-session-id", &session)
            .send()
            .await
            .unwrap();

        let rejected = http
            .post(&url)
            .header("mcp-session-id", &session)
            .body(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), 503);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn http_abandoned_sessions_expire_and_free_capacity() {
        let mut transport = HttpTransport::new(
            HttpTransportConfig {
                max_sessions: Some(2),
                session_idle_timeout: Some(Duration::from_millis(200)),
                session_sweep_interval: Duration::from_millis(50),
                ..local_config()
            },
            Echo::default(),
        );
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));
        let http = reqwest::Client::new();
        let post = |id: i64| {
            http.post(&url)
                .body(format!(r#"{{"jsonrpc":"2.0","id":{id},"method":"initialize"}}"#))
                .send()
        };

        // Clients that never send DELETE.
        assert_eq!(post(1).await.unwrap().status(), 200);
        assert_eq!(post(2).await.unwrap().status(), 200);
        assert_eq!(post(3).await.unwrap().status(), 503);
        assert_eq!(transport.session_count(), 2);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.session_count(), 0);
        assert_eq!(post(4).await.unwrap().status(), 200);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn http_api_key_gate() {
        let validator = InMemoryApiKeyValidator::new()
            .with_key(&SecretString::from("alice-key".to_string()), ApiKeyContext::new("alice"))
            .with_key(&SecretString::from("bob-key".to_string()), ApiKeyContext::new("bob"));
        let access = AccessControl::new(ApiKeyStrategy::new(validator), BinaryAuthorizationPolicy);
        let mut transport = HttpTransport::with_access(local_config(), Echo::default(), access);
        transport.start().await.unwrap();
        let url = format!("{}/mcp", base_url(transport.local_addr().unwrap()));
        let http = reqwest::Client::new();
        let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

        let missing = http.post(&url).body(ping).send().await.unwrap();
        assert_eq!(missing.status(), 401);
        assert!(missing.headers().contains_key("www-authenticate"));
        let body: Value = missing.json().await.unwrap();
        assert_eq!(body["error"]["code"], -32001);
        assert_eq!(body["error"]["message"], "authentication required");

        let wrong = http
            .post(&url)
            .header("x-api-key", "mallory-key")
            .body(ping)
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), 401);
        let body: Value = wrong.json().await.unwrap();
        assert_eq!(body["error"]["message"], "invalid credentials");

        let alice = http
            .post(&url)
            .header("x-api-key", "alice-key")
            .body(ping)
            .send()
            .await
            .unwrap();
        assert_eq!(alice.status(), 200);
        let session = alice.headers()["mcp-session-id"].to_str().unwrap().to_owned();

        // Bob cannot ride on Alice's session.
        let hijack = http
            .post(&url)
            .header("authorization", "Bearer bob-key")
            .header("mcp-session-id", &session)
            .body(ping)
            .send()
            .await
            .unwrap();
        assert_eq!(hijack.status(), 404);

        let client = HttpClient::new(HttpClientConfig {
            endpoint: url.clone(),
            credentials: Some(HttpCredentials::ApiKey {
                header: "x-api-key".into(),
                key: SecretString::from("bob-key".to_string()),
            }),
            ..Default::default()
        })
        .unwrap();
        let reply = client.call(JsonRpcRequest::new(9, "ping", None)).await.unwrap();
        assert!(reply.is_success());

        let anonymous = HttpClient::new(HttpClientConfig {
            endpoint: url,
            ..Default::default()
        })
        .unwrap();
        let rejected = anonymous.call(JsonRpcRequest::new(10, "ping", None)).await.unwrap();
        assert_eq!(rejected.error_object().unwrap().code, -32001);

        transport.close().await.unwrap();
    }
}
