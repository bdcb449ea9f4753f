//! Request/response client over a line-oriented pipe.
//!
//! The channel is strictly sequential: one request line out, one response
//! line back, under a lock. No correlation table is needed. Responses left
//! behind by timed-out calls are recognised by id and skipped.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mcp_protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{TransportClient, check_response_id};
use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct StdioClientConfig {
    /// Deadline for one `call`
    pub timeout: Duration,
    /// How long `close` waits for a spawned child to exit before killing it
    pub shutdown_grace: Duration,
}

impl Default for StdioClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

struct Pipe<R, W> {
    reader: R,
    writer: W,
    /// Bytes of the line being read. Survives a timed-out call so the next
    /// call resumes mid-line instead of reading a torn tail.
    line: Vec<u8>,
    /// Ids of calls that timed out; their responses may still arrive
    abandoned: HashSet<RequestId>,
}

pub struct StdioClient<R, W> {
    pipe: Mutex<Option<Pipe<R, W>>>,
    child: Mutex<Option<Child>>,
    ready: AtomicBool,
    config: StdioClientConfig,
}

impl StdioClient<BufReader<ChildStdout>, ChildStdin> {
    /// Spawn `program` and talk to it over its stdin/stdout. Its stderr is
    /// inherited.
    pub fn spawn(program: &str, args: &[String], config: StdioClientConfig) -> Result<Self, ClientError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(ClientError::NotReady)?;
        let stdout = child.stdout.take().ok_or(ClientError::NotReady)?;
        info!(program, pid = child.id(), "Spawned stdio server");

        let client = Self::with_streams(BufReader::new(stdout), stdin, config);
        *client.child.try_lock().map_err(|_| ClientError::NotReady)? = Some(child);
        Ok(client)
    }
}

impl<R, W> StdioClient<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_streams(reader: R, writer: W, config: StdioClientConfig) -> Self {
        Self {
            pipe: Mutex::new(Some(Pipe {
                reader,
                writer,
                line: Vec::new(),
                abandoned: HashSet::new(),
            })),
            child: Mutex::new(None),
            ready: AtomicBool::new(true),
            config,
        }
    }

    async fn write_line(pipe: &mut Pipe<R, W>, message: &JsonRpcMessage) -> Result<(), ClientError> {
        let line = message.to_line()?;
        pipe.writer.write_all(line.as_bytes()).await?;
        pipe.writer.flush().await?;
        Ok(())
    }

    /// Read lines until the response to `request` shows up.
    ///
    /// Cancel safe: `read_until` appends to `pipe.line`, which is only
    /// taken once a whole line is in it.
    async fn read_response(pipe: &mut Pipe<R, W>, request: &JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        loop {
            if pipe.reader.read_until(b'\n', &mut pipe.line).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            let line = std::mem::take(&mut pipe.line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let response = match JsonRpcMessage::from_slice(&line) {
                Ok(JsonRpcMessage::Response(response)) => response,
                Ok(other) => {
                    debug!(method = other.method().unwrap_or("-"), "Skipping server-initiated message");
                    continue;
                }
                Err(e) => return Err(ClientError::InvalidResponse(e.to_string())),
            };

            if let Some(id) = &response.id {
                if *id != request.id && pipe.abandoned.remove(id) {
                    debug!(request_id = %id, "Discarding response to abandoned call");
                    continue;
                }
            }
            check_response_id(request, &response)?;
            return Ok(response);
        }
    }

    fn mark_closed(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

impl<R, W> TransportClient for StdioClient<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        let mut guard = self.pipe.lock().await;
        let pipe = guard.as_mut().ok_or(ClientError::NotReady)?;

        let message = JsonRpcMessage::Request(request.clone());
        if let Err(e) = Self::write_line(pipe, &message).await {
            self.mark_closed();
            return Err(e);
        }

        match tokio::time::timeout(self.config.timeout, Self::read_response(pipe, &request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                if matches!(e, ClientError::ConnectionClosed | ClientError::Io(_)) {
                    self.mark_closed();
                }
                Err(e)
            }
            Err(_) => {
                warn!(request_id = %request.id, "Stdio call timed out");
                pipe.abandoned.insert(request.id);
                Err(ClientError::Timeout)
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        let mut guard = self.pipe.lock().await;
        let pipe = guard.as_mut().ok_or(ClientError::NotReady)?;
        Self::write_line(pipe, &notification.into()).await
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.mark_closed();
        // Dropping the writer closes the child's stdin.
        self.pipe.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                Ok(status) => debug!(status = ?status, "Stdio server exited"),
                Err(_) => {
                    warn!("Stdio server did not exit, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}
