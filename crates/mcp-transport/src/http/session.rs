//! HTTP sessions: one event stream per `Mcp-Session-Id`.
//!
//! Every server-initiated message pushed to a session gets a monotonically
//! increasing event id and lands in a bounded history, so a client that
//! reconnects with `Last-Event-ID` can catch up on what it missed.
//!
//! Sessions nobody has touched for the idle timeout, and that have no open
//! stream, are evicted. Clients that vanish without `DELETE` would otherwise
//! hold the session cap forever.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mcp_protocol::JsonRpcMessage;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::TransportError;

/// Capacity of each session's live channel
const LIVE_CAPACITY: usize = 256;

/// One server-sent event.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub id: u64,
    pub data: Arc<str>,
}

struct History {
    next_id: u64,
    events: VecDeque<SessionEvent>,
}

pub struct Session {
    id: String,
    /// Principal that created the session; other principals may not use it
    owner: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
    history: Mutex<History>,
    history_limit: usize,
    live: broadcast::Sender<SessionEvent>,
}

impl Session {
    fn new(owner: Option<String>, history_limit: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            history: Mutex::new(History {
                next_id: 1,
                events: VecDeque::with_capacity(history_limit.min(64)),
            }),
            history_limit,
            live,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mark the session as in use.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last request or stream on this session.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Whether `principal` may use this session.
    pub fn is_owned_by(&self, principal: Option<&str>) -> bool {
        self.owner.as_deref() == principal
    }

    /// Record `message` and deliver it to open streams. Returns its event id.
    pub fn push(&self, message: &JsonRpcMessage) -> Result<u64, TransportError> {
        let data: Arc<str> = message.to_json()?.into();
        let mut history = self.history.lock();
        let event = SessionEvent {
            id: history.next_id,
            data,
        };
        history.next_id += 1;
        history.events.push_back(event.clone());
        while history.events.len() > self.history_limit {
            history.events.pop_front();
        }
        // Sent under the lock so a concurrent `subscribe` sees each event
        // either in its replay or on its receiver, never both or neither.
        let _ = self.live.send(event);
        Ok(history.next_id - 1)
    }

    /// Open a stream: events newer than `last_event_id` still in the
    /// history, plus a receiver for everything after.
    pub fn subscribe(&self, last_event_id: Option<u64>) -> (Vec<SessionEvent>, broadcast::Receiver<SessionEvent>) {
        let history = self.history.lock();
        let replay = match last_event_id {
            Some(last) => history
                .events
                .iter()
                .filter(|e| e.id > last)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        (replay, self.live.subscribe())
    }

    /// Open event streams on this session.
    pub fn stream_count(&self) -> usize {
        self.live.receiver_count()
    }

    pub fn buffered(&self) -> usize {
        self.history.lock().events.len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Store
// ─────────────────────────────────────────────────────────────────────────────

/// All live sessions of one HTTP transport.
///
/// Removing a session drops its live sender once no request still holds it,
/// which ends every event stream attached to it.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    max_sessions: Option<usize>,
    history_limit: usize,
    idle_timeout: Option<Duration>,
}

impl SessionStore {
    pub fn new(max_sessions: Option<usize>, history_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            history_limit,
            idle_timeout: None,
        }
    }

    /// Evict sessions idle for longer than `timeout` (`None` keeps them forever).
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Create a session for `owner`. `None` when the store is full.
    pub fn create(&self, owner: Option<String>) -> Option<Arc<Session>> {
        if let Some(max) = self.max_sessions {
            if self.sessions.len() >= max {
                return None;
            }
        }
        let session = Arc::new(Session::new(owner, self.history_limit));
        self.sessions
            .insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        Some(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        if removed.is_some() {
            debug!(session_id = %id, "Session terminated");
        }
        removed
    }

    /// Drop sessions idle for longer than `max_idle`. A session with an open
    /// stream or a request still holding it is kept. Returns the evicted ids.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let keep = session.stream_count() > 0 || Arc::strong_count(session) > 1 || session.idle_for() < max_idle;
            if !keep {
                debug!(session_id = %id, "Session expired");
                evicted.push(id.clone());
            }
            keep
        });
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Apply the configured idle timeout, if any.
    pub fn evict_expired(&self) -> Vec<String> {
        match self.idle_timeout {
            Some(timeout) => self.evict_idle(timeout),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Push `message` to every session. Returns how many received it.
    pub fn broadcast(&self, message: &JsonRpcMessage) -> Result<usize, TransportError> {
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        for session in &sessions {
            session.push(message)?;
        }
        Ok(sessions.len())
    }

    pub fn send_to(&self, id: &str, message: &JsonRpcMessage) -> Result<u64, TransportError> {
        let session = self
            .get(id)
            .ok_or_else(|| TransportError::UnknownSession(id.to_owned()))?;
        session.push(message)
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}
