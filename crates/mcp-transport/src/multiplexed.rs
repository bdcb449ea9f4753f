//! Concurrent request/response client over one full-duplex line stream.
//!
//! Many calls can be in flight at once. A reader task owns the read half:
//! responses are matched to their callers through a [`CorrelationManager`],
//! everything else (server-initiated requests and notifications) is handed
//! to the caller through an inbound channel. Requests from the server are
//! answered with [`MultiplexedClient::respond`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mcp_correlation::{CorrelationConfig, CorrelationManager, RequestIdGenerator};
use mcp_protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{TransportClient, check_response_id};
use crate::error::ClientError;

/// Buffered server-initiated messages before new ones are dropped
const INBOUND_CAPACITY: usize = 64;

pub struct MultiplexedClient<W> {
    writer: Mutex<W>,
    correlation: CorrelationManager,
    ids: RequestIdGenerator,
    ready: Arc<AtomicBool>,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<W> MultiplexedClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Start the reader task and return the client together with the
    /// receiver of server-initiated messages. Must be called inside a Tokio
    /// runtime.
    pub fn new<R>(reader: R, writer: W, config: CorrelationConfig) -> (Self, mpsc::Receiver<JsonRpcMessage>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let correlation = CorrelationManager::start(config);
        let ready = Arc::new(AtomicBool::new(true));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let task = tokio::spawn(read_loop(reader, correlation.clone(), inbound_tx, ready.clone()));

        let client = Self {
            writer: Mutex::new(writer),
            correlation,
            ids: RequestIdGenerator::new(),
            ready,
            reader_task: parking_lot::Mutex::new(Some(task)),
        };
        (client, inbound_rx)
    }

    /// Call `method` with a fresh numeric id.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ClientError> {
        self.call(JsonRpcRequest::new(self.ids.next_id(), method, params)).await
    }

    /// Calls currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.correlation.pending_count()
    }

    /// Answer a server-initiated request taken from the inbound channel.
    pub async fn respond(&self, response: JsonRpcResponse) -> Result<(), ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        self.write_line(&response.into()).await
    }

    pub fn correlation(&self) -> &CorrelationManager {
        &self.correlation
    }

    async fn write_line(&self, message: &JsonRpcMessage) -> Result<(), ClientError> {
        let line = message.to_line()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl<W> TransportClient for MultiplexedClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        let handle = self.correlation.register(request.id.clone())?;

        let message = JsonRpcMessage::Request(request.clone());
        if let Err(e) = self.write_line(&message).await {
            self.correlation.cancel(&request.id);
            return Err(e);
        }

        let response = handle.wait().await?;
        check_response_id(&request, &response)?;
        Ok(response)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        self.write_line(&notification.into()).await
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && !self.correlation.is_closed()
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.ready.store(false, Ordering::Release);
        let cancelled = self.correlation.shutdown().await;
        if cancelled > 0 {
            debug!(cancelled, "Cancelled in-flight calls on close");
        }
        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

impl<W> Drop for MultiplexedClient<W> {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }
}

async fn read_loop<R>(
    reader: R,
    correlation: CorrelationManager,
    inbound: mpsc::Sender<JsonRpcMessage>,
    ready: Arc<AtomicBool>,
) where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match JsonRpcMessage::parse(&line) {
                    Ok(JsonRpcMessage::Response(response)) => match response.id.clone() {
                        Some(id) => {
                            correlation.resolve(&id, response);
                        }
                        None => warn!("Dropping response without id"),
                    },
                    Ok(other) => {
                        if let Err(e) = inbound.try_send(other) {
                            debug!(error = %e, "Inbound message dropped");
                        }
                    }
                    Err(e) => warn!(error = %e, "Undecodable line from peer"),
                }
            }
            Ok(None) => {
                debug!("Peer closed the stream");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                break;
            }
        }
    }

    // Closed, so a call registering concurrently fails instead of waiting
    // out its timeout.
    ready.store(false, Ordering::Release);
    let cancelled = correlation.shutdown().await;
    if cancelled > 0 {
        debug!(cancelled, "Cancelled in-flight calls after stream end");
    }
}
