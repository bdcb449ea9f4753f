//! Correlation manager: tracks outstanding requests by id.
//!
//! Flow:
//! 1. Sender calls `register(id)` and gets a [`PendingHandle`]
//! 2. Sender writes the request on the wire
//! 3. The receive path calls `resolve(id, response)` when a response arrives
//! 4. The sender awaits `handle.wait()`, which yields the response, a
//!    timeout, or a cancellation
//!
//! The table is a `DashMap`, so unrelated ids never contend on one lock.
//! Whoever removes an entry (resolve, sweep, cancel, or the handle itself at
//! its deadline) is the only one allowed to complete its slot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mcp_protocol::{JsonRpcResponse, RequestId};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{CorrelationError, CorrelationResult};
use crate::types::{CallResult, CorrelationConfig, CorrelationStats, PendingCall, StatsSnapshot};

/// Shared correlation table. Cloning is cheap and every clone sees the same table.
#[derive(Clone)]
pub struct CorrelationManager {
    inner: Arc<Inner>,
}

struct Inner {
    pending: DashMap<RequestId, PendingCall>,
    /// Reserved slots; kept separately so the capacity check is exact
    occupied: AtomicUsize,
    config: CorrelationConfig,
    stats: CorrelationStats,
    recently_expired: Mutex<VecDeque<RequestId>>,
    closed: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CorrelationManager {
    /// Create a manager without a background sweep. Deadlines are still
    /// enforced by each [`PendingHandle`]; call [`sweep_expired`](Self::sweep_expired)
    /// to purge abandoned entries.
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                occupied: AtomicUsize::new(0),
                recently_expired: Mutex::new(VecDeque::with_capacity(config.late_response_memory)),
                config,
                stats: CorrelationStats::default(),
                closed: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Create a manager and spawn its sweep task. Must be called inside a
    /// Tokio runtime.
    pub fn start(config: CorrelationConfig) -> Self {
        let manager = Self::new(config);
        let handle = spawn_sweeper(
            Arc::downgrade(&manager.inner),
            manager.inner.config.sweep_interval,
        );
        *manager.inner.sweeper.lock() = Some(handle);
        manager
    }

    /// Register `id` with the default timeout.
    pub fn register(&self, id: RequestId) -> CorrelationResult<PendingHandle> {
        self.register_with_timeout(id, self.inner.config.default_timeout)
    }

    /// Register `id` with an explicit timeout.
    pub fn register_with_timeout(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> CorrelationResult<PendingHandle> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CorrelationError::Cancelled);
        }

        self.inner.reserve_slot()?;

        let (tx, rx) = oneshot::channel();
        let call = PendingCall::new(tx, timeout);
        let deadline = call.deadline;

        match self.inner.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                self.inner.release_slot();
                return Err(CorrelationError::DuplicateId(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(call);
            }
        }

        // `shutdown` may have swept the table between the check above and
        // the insert. The entry would then never be cancelled.
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.take(&id);
            return Err(CorrelationError::Cancelled);
        }

        self.inner.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %id, timeout_ms = timeout.as_millis() as u64, "Registered pending call");

        Ok(PendingHandle {
            inner: self.inner.clone(),
            id,
            deadline,
            timeout,
            receiver: rx,
        })
    }

    /// Deliver a response to its waiting caller.
    ///
    /// Returns false when no call with that id is pending (late response,
    /// duplicate response, or peer protocol violation). That case is logged
    /// and otherwise ignored.
    pub fn resolve(&self, id: &RequestId, response: JsonRpcResponse) -> bool {
        self.try_resolve(id, response).is_ok()
    }

    /// Like [`resolve`](Self::resolve) but reports an unknown id as an error.
    pub fn try_resolve(&self, id: &RequestId, response: JsonRpcResponse) -> CorrelationResult<()> {
        let Some(call) = self.inner.take(id) else {
            self.inner.stats.unknown.fetch_add(1, Ordering::Relaxed);
            if self.inner.was_recently_expired(id) {
                debug!(request_id = %id, "Dropping late response for timed-out call");
            } else {
                warn!(request_id = %id, "Response for unknown request id");
            }
            return Err(CorrelationError::UnknownId(id.clone()));
        };

        let elapsed = call.registered_at.elapsed();
        if call.slot.send(Ok(response)).is_err() {
            debug!(request_id = %id, "Caller went away before its response arrived");
        } else {
            debug!(request_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Resolved pending call");
        }
        self.inner.stats.resolved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cancel one pending call. Other calls are unaffected.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.inner.take(id) {
            Some(call) => {
                let _ = call.slot.send(Err(CorrelationError::Cancelled));
                self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Resolve every pending call with `error`. Returns how many were resolved.
    pub fn cancel_all(&self, error: CorrelationError) -> usize {
        let ids: Vec<RequestId> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        let mut count = 0;
        for id in ids {
            if let Some(call) = self.inner.take(&id) {
                let _ = call.slot.send(Err(error.clone()));
                self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, error = %error, "Cancelled pending calls");
        }
        count
    }

    /// Resolve every call past its deadline with a timeout. Returns how many expired.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Stop the sweep task and cancel everything still pending.
    ///
    /// Every remaining caller is resolved with `Cancelled` before this
    /// returns; later registrations fail with `Cancelled`.
    pub async fn shutdown(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let sweeper = self.inner.sweeper.lock().take();
        if let Some(handle) = sweeper {
            handle.abort();
            let _ = handle.await;
        }
        let cancelled = self.cancel_all(CorrelationError::Cancelled);
        debug!(cancelled, "Correlation manager shut down");
        cancelled
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.inner.config
    }
}

impl Default for CorrelationManager {
    fn default() -> Self {
        Self::new(CorrelationConfig::default())
    }
}

impl Inner {
    fn reserve_slot(&self) -> CorrelationResult<()> {
        let Some(capacity) = self.config.max_pending else {
            self.occupied.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        let previous = self.occupied.fetch_add(1, Ordering::AcqRel);
        if previous >= capacity {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
            warn!(capacity, "Correlation table full, rejecting request");
            return Err(CorrelationError::CapacityExceeded { capacity });
        }
        Ok(())
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    /// Remove an entry; the caller now owns its completion slot.
    fn take(&self, id: &RequestId) -> Option<PendingCall> {
        let (_, call) = self.pending.remove(id)?;
        self.release_slot();
        Some(call)
    }

    fn expire(&self, id: &RequestId, call: PendingCall) {
        let timeout = call.timeout();
        let _ = call.slot.send(Err(CorrelationError::Timeout {
            id: id.clone(),
            timeout,
        }));
        self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
        self.remember_expired(id.clone());
        debug!(request_id = %id, timeout_ms = timeout.as_millis() as u64, "Pending call timed out");
    }

    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|e| e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();

        let mut count = 0;
        for id in expired {
            // Re-check under removal: a response may have won the race.
            if let Some(call) = self.take(&id) {
                self.expire(&id, call);
                count += 1;
            }
        }
        count
    }

    fn remember_expired(&self, id: RequestId) {
        let cap = self.config.late_response_memory;
        if cap == 0 {
            return;
        }
        let mut recent = self.recently_expired.lock();
        if recent.len() >= cap {
            recent.pop_front();
        }
        recent.push_back(id);
    }

    fn was_recently_expired(&self, id: &RequestId) -> bool {
        self.recently_expired.lock().contains(id)
    }
}

fn spawn_sweeper(inner: Weak<Inner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let expired = inner.sweep_expired();
            if expired > 0 {
                debug!(expired, "Swept expired pending calls");
            }
        }
    })
}

/// Caller-side handle for one pending call.
///
/// Dropping the handle abandons the call; its table entry is purged by the
/// sweep at its deadline.
pub struct PendingHandle {
    inner: Arc<Inner>,
    id: RequestId,
    deadline: Instant,
    timeout: Duration,
    receiver: oneshot::Receiver<CallResult>,
}

impl PendingHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response, a timeout, or a cancellation.
    pub async fn wait(mut self) -> CallResult {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CorrelationError::Cancelled),
            Err(_) => match self.inner.take(&self.id) {
                Some(call) => {
                    // Completing the slot we also hold keeps the timeout
                    // accounting in one place.
                    self.inner.expire(&self.id, call);
                    Err(CorrelationError::Timeout {
                        id: self.id.clone(),
                        timeout: self.timeout,
                    })
                }
                // Someone else removed the entry and will complete the slot.
                None => match self.receiver.await {
                    Ok(result) => result,
                    Err(_) => Err(CorrelationError::Cancelled),
                },
            },
        }
    }
}

impl std::fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
