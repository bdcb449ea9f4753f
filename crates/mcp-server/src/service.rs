//! The unit of functionality the router dispatches to.

use std::future::Future;
use std::pin::Pin;

use mcp_protocol::HandlerResult;
use serde_json::Value;

pub type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Trait implemented by all MCP services.
///
/// Each service handles a namespace of methods (e.g. `tools` for
/// `tools/list` and `tools/call`).
pub trait Service: Send + Sync + 'static {
    /// The namespace prefix this service handles.
    fn namespace(&self) -> &str;

    /// Handle a request within this service's namespace. `method` is the full
    /// method string.
    fn handle(&self, method: &str, params: Option<Value>) -> impl Future<Output = HandlerResult> + Send;

    /// Called once when the server starts.
    fn init(&self) -> impl Future<Output = InitResult> + Send {
        async { Ok(()) }
    }

    /// Called once at server shutdown.
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for [`Service`].
pub(crate) trait ServiceDyn: Send + Sync {
    fn namespace_dyn(&self) -> &str;
    fn handle_dyn<'a>(&'a self, method: &'a str, params: Option<Value>) -> BoxFuture<'a, HandlerResult>;
    fn init_dyn(&self) -> BoxFuture<'_, InitResult>;
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()>;
}

impl<T: Service> ServiceDyn for T {
    fn namespace_dyn(&self) -> &str {
        self.namespace()
    }

    fn handle_dyn<'a>(&'a self, method: &'a str, params: Option<Value>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.handle(method, params))
    }

    fn init_dyn(&self) -> BoxFuture<'_, InitResult> {
        Box::pin(self.init())
    }

    fn shutdown_dyn(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}
