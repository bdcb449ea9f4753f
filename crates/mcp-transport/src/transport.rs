//! Server-side transport contract and its lifecycle state.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};

use mcp_protocol::JsonRpcMessage;
use tokio::sync::Notify;

use crate::error::TransportError;

/// Lifecycle of a transport. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Running,
    Closed,
}

/// Event-driven channel bound to a [`MessageHandler`](crate::MessageHandler)
/// at construction.
///
/// There is no way to replace the handler after construction; a running
/// transport may already be dispatching on several tasks.
pub trait Transport: Send + Sync {
    /// Begin reading or accepting. Fails if already started or closed.
    fn start(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write a server-initiated message on the active channel.
    fn send(&self, message: &JsonRpcMessage) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Orderly shutdown. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn state(&self) -> TransportState;

    fn transport_type(&self) -> &'static str;

    fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Shared state cell with a close notification.
///
/// Exactly one caller wins the move to `Closed`; that caller owns the
/// close-side effects (notifying the handler).
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    closed: Notify,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        match self.state.load(Ordering::Acquire) {
            IDLE => TransportState::Idle,
            RUNNING => TransportState::Running,
            _ => TransportState::Closed,
        }
    }

    pub fn start(&self) -> Result<(), TransportError> {
        match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(RUNNING) => Err(TransportError::AlreadyStarted),
            Err(_) => Err(TransportError::ConnectionClosed),
        }
    }

    /// Move to `Closed`. Returns true only for the caller that moved it out
    /// of `Running`.
    pub fn close(&self) -> bool {
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous != CLOSED {
            self.closed.notify_waiters();
        }
        previous == RUNNING
    }

    pub fn ensure_running(&self) -> Result<(), TransportError> {
        if self.state.load(Ordering::Acquire) == RUNNING {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }

    pub async fn wait_closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.state.load(Ordering::Acquire) == CLOSED {
                return;
            }
            notified.await;
        }
    }
}
