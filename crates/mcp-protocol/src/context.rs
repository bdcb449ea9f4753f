//! Message context: per-message envelope threaded from transport to handler.
//!
//! Every inbound message gets a fresh [`MessageContext`] built by the
//! transport that received it. The context carries an optional session id
//! plus a transport-specific payload `T`: HTTP request data for the HTTP
//! transport, `()` for pipe transports. Handlers only ever borrow it.

use chrono::{DateTime, Utc};

/// Context for a single inbound message.
#[derive(Debug, Clone)]
pub struct MessageContext<T = ()> {
    session_id: Option<String>,
    received_at: DateTime<Utc>,
    transport_data: T,
}

impl<T> MessageContext<T> {
    /// Context without a session.
    pub fn new(transport_data: T) -> Self {
        Self {
            session_id: None,
            received_at: Utc::now(),
            transport_data,
        }
    }

    /// Context bound to a session.
    pub fn with_session(session_id: impl Into<String>, transport_data: T) -> Self {
        Self {
            session_id: Some(session_id.into()),
            received_at: Utc::now(),
            transport_data,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn transport_data(&self) -> &T {
        &self.transport_data
    }
}

impl MessageContext<()> {
    /// Context for pipe transports, which carry no transport data.
    pub fn pipe() -> Self {
        Self::new(())
    }
}

impl<T: Default> Default for MessageContext<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
