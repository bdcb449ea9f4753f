//! MCP method name constants: every JSON-RPC method grouped by namespace.
//!
//! Each constant is the exact string sent over the wire as the `method`
//! field of a JSON-RPC request or notification.

/// All MCP method names, grouped by namespace.
pub struct Methods;

impl Methods {
    // ── Lifecycle ───────────────────────────────────────────────────────
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";

    // ── Tools ───────────────────────────────────────────────────────────
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    // ── Resources ───────────────────────────────────────────────────────
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

    // ── Prompts ─────────────────────────────────────────────────────────
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";

    // ── Logging / completion ────────────────────────────────────────────
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
}

/// MCP notification names.
pub struct Notifications;

impl Notifications {
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PROGRESS: &str = "notifications/progress";
    pub const MESSAGE: &str = "notifications/message";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

/// Returns true if the given string is a known MCP method or notification.
pub fn is_known_method(method: &str) -> bool {
    match method {
        Methods::INITIALIZE | Methods::PING => true,
        _ => matches!(
            method.split('/').next(),
            Some("tools")
                | Some("resources")
                | Some("prompts")
                | Some("logging")
                | Some("completion")
                | Some("notifications")
        ),
    }
}

/// Namespace of a method: the segment before the first `/`, or the whole name.
pub fn namespace_of(method: &str) -> &str {
    method.split('/').next().unwrap_or(method)
}

/// Type alias: the method name is always a `&str` at the protocol level.
pub type MethodName = &'static str;
