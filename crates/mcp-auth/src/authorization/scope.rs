//! Method → scope requirement table.
//!
//! Built once at startup and shared read-only. Lookups try, in order: the
//! exact method name, the longest `prefix/*` pattern, the `*` default, and
//! finally a derived scope `<prefix>:<method>` when one is configured.

use std::borrow::Cow;
use std::collections::HashMap;

use mcp_protocol::Methods;

/// What a method needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// Anyone who passed authentication may call it.
    Public,
    /// At least one of these scopes must be granted.
    AnyOf(Cow<'a, [String]>),
}

#[derive(Debug, Clone, Default)]
pub struct ScopeRequirements {
    exact: HashMap<String, Vec<String>>,
    /// `(prefix, scopes)`, longest prefix first
    prefixes: Vec<(String, Vec<String>)>,
    fallback: Option<Vec<String>>,
    derived_prefix: Option<String>,
}

impl ScopeRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require any of `scopes` for `pattern`: an exact method name,
    /// `namespace/*`, or `*`. An empty scope list makes the pattern public.
    pub fn require<I, S>(mut self, pattern: &str, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        if pattern == "*" {
            self.fallback = Some(scopes);
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            self.prefixes.retain(|(p, _)| p != prefix);
            self.prefixes.push((prefix.to_string(), scopes));
            self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        } else {
            self.exact.insert(pattern.to_string(), scopes);
        }
        self
    }

    pub fn public(self, pattern: &str) -> Self {
        self.require(pattern, Vec::<String>::new())
    }

    /// Methods with no other entry require `<prefix>:<method>`.
    pub fn derive_from_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.derived_prefix = Some(prefix.into());
        self
    }

    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        map.into_iter()
            .fold(Self::new(), |table, (pattern, scopes)| table.require(&pattern, scopes))
    }

    /// Standard MCP method scopes. Unlisted methods derive `mcp:<method>`;
    /// notifications are public.
    pub fn mcp_defaults() -> Self {
        Self::new()
            .require(Methods::TOOLS_CALL, ["mcp:tools:execute"])
            .require(Methods::TOOLS_LIST, ["mcp:tools:read"])
            .require(Methods::RESOURCES_READ, ["mcp:resources:read"])
            .require(Methods::RESOURCES_LIST, ["mcp:resources:list"])
            .require(Methods::RESOURCES_TEMPLATES_LIST, ["mcp:resources:list"])
            .require(Methods::RESOURCES_SUBSCRIBE, ["mcp:resources:subscribe"])
            .require(Methods::RESOURCES_UNSUBSCRIBE, ["mcp:resources:subscribe"])
            .require(Methods::PROMPTS_GET, ["mcp:prompts:read"])
            .require(Methods::PROMPTS_LIST, ["mcp:prompts:list"])
            .require(Methods::LOGGING_SET_LEVEL, ["mcp:logging:configure"])
            .require(Methods::COMPLETION_COMPLETE, ["mcp:completion:read"])
            .public("notifications/*")
            .derive_from_prefix("mcp")
    }

    /// Requirement for `method`, or `None` when nothing covers it.
    pub fn requirement(&self, method: &str) -> Option<Requirement<'_>> {
        let scopes = self
            .exact
            .get(method)
            .or_else(|| {
                self.prefixes
                    .iter()
                    .find(|(prefix, _)| method.starts_with(prefix.as_str()))
                    .map(|(_, scopes)| scopes)
            })
            .or(self.fallback.as_ref());

        match scopes {
            Some(scopes) if scopes.is_empty() => Some(Requirement::Public),
            Some(scopes) => Some(Requirement::AnyOf(Cow::Borrowed(scopes.as_slice()))),
            None => self
                .derived_prefix
                .as_ref()
                .map(|prefix| Requirement::AnyOf(Cow::Owned(vec![format!("{prefix}:{method}")]))),
        }
    }

    /// Every scope this table can ask for, sorted. A derived prefix is
    /// advertised as `<prefix>:*`.
    pub fn all_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .exact
            .values()
            .chain(self.prefixes.iter().map(|(_, s)| s))
            .chain(self.fallback.iter())
            .flatten()
            .cloned()
            .collect();
        if let Some(prefix) = &self.derived_prefix {
            scopes.push(format!("{prefix}:*"));
        }
        scopes.sort();
        scopes.dedup();
        scopes
    }
}

/// Whether a granted scope satisfies a required one. A granted scope ending
/// in `:*` covers everything under that prefix.
pub fn scope_covers(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) if prefix.ends_with(':') => required.starts_with(prefix),
        _ => false,
    }
}
