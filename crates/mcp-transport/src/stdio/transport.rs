//! Newline-delimited JSON-RPC over a byte stream pair (stdin/stdout by default).
//!
//! One reader task splits input into lines and spawns a task per message, so
//! a slow handler never blocks the next line. All output (replies, error
//! responses, `send`) goes through one locked writer, one line at a time.

use std::sync::Arc;

use mcp_protocol::{JsonRpcMessage, MessageContext};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::handler::MessageHandler;
use crate::transport::{Lifecycle, Transport, TransportState};

/// Stdio transport bound to handler `H`.
pub struct StdioTransport<H, R = BufReader<Stdin>, W = Stdout> {
    shared: Arc<Shared<H, W>>,
    reader: Option<R>,
    reader_task: Option<JoinHandle<()>>,
}

struct Shared<H, W> {
    handler: H,
    writer: Mutex<W>,
    lifecycle: Lifecycle,
}

impl<H: MessageHandler<()>> StdioTransport<H> {
    /// Bind to the process's stdin and stdout.
    pub fn new(handler: H) -> Self {
        Self::with_streams(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<H, R, W> StdioTransport<H, R, W>
where
    H: MessageHandler<()>,
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn with_streams(handler: H, reader: R, writer: W) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                writer: Mutex::new(writer),
                lifecycle: Lifecycle::new(),
            }),
            reader: Some(reader),
            reader_task: None,
        }
    }

    /// Resolves once the transport is closed (EOF, I/O failure, or `close`).
    pub async fn wait_closed(&self) {
        self.shared.lifecycle.wait_closed().await;
    }
}

impl<H, R, W> Transport for StdioTransport<H, R, W>
where
    H: MessageHandler<()>,
    R: AsyncBufRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&mut self) -> Result<(), TransportError> {
        self.shared.lifecycle.start()?;
        let reader = self.reader.take().ok_or(TransportError::AlreadyStarted)?;
        info!("Stdio transport started");
        self.reader_task = Some(tokio::spawn(read_loop(self.shared.clone(), reader)));
        Ok(())
    }

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        self.shared.lifecycle.ensure_running()?;
        self.shared.write(message).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.shared.lifecycle.close() {
            self.shared.handler.handle_close().await;
        }
        if let Some(task) = self.reader_task.take() {
            let _ = task.await;
        }
        let mut writer = self.shared.writer.lock().await;
        let _ = writer.flush().await;
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.shared.lifecycle.state()
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

impl<H, W> Shared<H, W>
where
    H: MessageHandler<()>,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        let line = message.to_line()?;
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        if let Err(e) = result {
            warn!(error = %e, "Stdio write failed, closing transport");
            self.fail(TransportError::Io(e)).await;
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    /// Terminal I/O failure: report it, then close.
    async fn fail(&self, error: TransportError) {
        self.handler.handle_error(error).await;
        if self.lifecycle.close() {
            self.handler.handle_close().await;
        }
    }

    async fn dispatch(&self, line: String) {
        let message = match JsonRpcMessage::parse(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Undecodable line");
                if e.recoverable_id().is_some() {
                    let _ = self.write(&e.to_response().into()).await;
                } else {
                    self.handler
                        .handle_error(TransportError::InvalidMessage(e.to_string()))
                        .await;
                }
                return;
            }
        };

        let context = MessageContext::new(());
        if let Some(reply) = self.handler.handle_message(message, &context).await {
            if self.lifecycle.ensure_running().is_ok() {
                let _ = self.write(&reply).await;
            }
        }
    }
}

async fn read_loop<H, R, W>(shared: Arc<Shared<H, W>>, reader: R)
where
    H: MessageHandler<()>,
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = reader.lines();
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line,
            _ = shared.lifecycle.wait_closed() => return,
        };
        match next {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let shared = shared.clone();
                tokio::spawn(async move { shared.dispatch(line).await });
            }
            Ok(None) => {
                info!("Stdio input closed");
                if shared.lifecycle.close() {
                    shared.handler.handle_close().await;
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Stdio read failed");
                shared.fail(TransportError::Io(e)).await;
                return;
            }
        }
    }
}
