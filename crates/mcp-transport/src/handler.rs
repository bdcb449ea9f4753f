//! The handler a server-side transport is bound to.

use std::future::Future;
use std::sync::Arc;

use mcp_protocol::{JsonRpcMessage, MessageContext};

use crate::error::TransportError;

/// Receives every inbound message of a transport.
///
/// `T` is the transport payload carried in the [`MessageContext`]: `()` for
/// pipes, [`HttpContext`](crate::http::HttpContext) for HTTP. A handler that
/// does not care implements this for every `T`.
pub trait MessageHandler<T = ()>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    /// Handle one message. The returned message, if any, is written back to
    /// the peer on the same channel or session.
    fn handle_message(
        &self,
        message: JsonRpcMessage,
        context: &MessageContext<T>,
    ) -> impl Future<Output = Option<JsonRpcMessage>> + Send;

    /// A failure the transport could not answer on the wire.
    fn handle_error(&self, _error: TransportError) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }

    /// A session ended: deleted by its client or expired.
    fn handle_session_closed(&self, _session_id: &str) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }

    /// The transport stopped. Called once.
    fn handle_close(&self) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }
}

impl<T, H> MessageHandler<T> for Arc<H>
where
    T: Send + Sync + 'static,
    H: MessageHandler<T>,
{
    fn handle_message(
        &self,
        message: JsonRpcMessage,
        context: &MessageContext<T>,
    ) -> impl Future<Output = Option<JsonRpcMessage>> + Send {
        (**self).handle_message(message, context)
    }

    fn handle_error(&self, error: TransportError) -> impl Future<Output = ()> + Send {
        (**self).handle_error(error)
    }

    fn handle_session_closed(&self, session_id: &str) -> impl Future<Output = ()> + Send {
        (**self).handle_session_closed(session_id)
    }

    fn handle_close(&self) -> impl Future<Output = ()> + Send {
        (**self).handle_close()
    }
}
