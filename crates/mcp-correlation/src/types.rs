//! Configuration, table entries, id generation, and statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use mcp_protocol::{JsonRpcResponse, RequestId};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::CorrelationError;

/// What a waiting caller eventually receives.
pub type CallResult = Result<JsonRpcResponse, CorrelationError>;

/// Correlation manager configuration.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Deadline applied when `register` is called without an explicit timeout
    pub default_timeout: Duration,
    /// How often the background sweep looks for expired calls
    pub sweep_interval: Duration,
    /// Maximum number of pending calls (None = unbounded)
    pub max_pending: Option<usize>,
    /// How many recently expired ids are remembered to classify late responses
    pub late_response_memory: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            max_pending: Some(1024),
            late_response_memory: 128,
        }
    }
}

/// One in-flight request, owned exclusively by the manager's table.
#[derive(Debug)]
pub(crate) struct PendingCall {
    /// Completion slot; consumed by whoever removes the entry
    pub slot: oneshot::Sender<CallResult>,
    pub registered_at: Instant,
    pub deadline: Instant,
}

impl PendingCall {
    pub fn new(slot: oneshot::Sender<CallResult>, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            slot,
            registered_at: now,
            deadline: now + timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.deadline.duration_since(self.registered_at)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Thread-safe numeric request id source, starting at 1.
#[derive(Debug)]
pub struct RequestIdGenerator {
    counter: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Live counters, updated lock-free.
#[derive(Debug, Default)]
pub(crate) struct CorrelationStats {
    pub registered: AtomicU64,
    pub resolved: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    pub unknown: AtomicU64,
}

impl CorrelationStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the correlation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    /// Responses that matched no pending call (late, duplicate, or bogus)
    pub unknown: u64,
}
