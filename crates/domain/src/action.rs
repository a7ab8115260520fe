//! The canonical action — the single evaluation input every adapter
//! (MCP, HTTP proxy, runtime hooks, SDK evaluate) normalizes into before
//! the interceptor chain sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What kind of thing the agent is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    ToolCall,
    HttpRequest,
    FileAccess,
    CommandExec,
    OutboundConnect,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::HttpRequest => "http_request",
            Self::FileAccess => "file_access",
            Self::CommandExec => "command_exec",
            Self::OutboundConnect => "outbound_connect",
        }
    }
}

/// Which transport the action arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Mcp,
    Http,
    Runtime,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mcp => "mcp",
            Self::Http => "http",
            Self::Runtime => "runtime",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CanonicalAction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The unified evaluation input.
///
/// Adapters fill whatever fields their protocol knows about; `normalize()`
/// fills the rest so downstream consumers (expression environment, audit)
/// never see missing mandatory fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAction {
    /// Opaque unique id; generated when the adapter does not supply one.
    #[serde(default)]
    pub request_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_name: String,
    /// MCP-style alias for `action_name`; reconciled by `normalize()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,

    // ── Identity ──────────────────────────────────────────────────────
    #[serde(default)]
    pub identity_id: String,
    #[serde(default)]
    pub identity_name: String,
    #[serde(default)]
    pub identity_roles: Vec<String>,

    // ── Optional, by action type ─────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Default for CanonicalAction {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            timestamp: Utc::now(),
            action_type: ActionType::default(),
            action_name: String::new(),
            tool_name: None,
            protocol: Protocol::default(),
            identity_id: String::new(),
            identity_name: String::new(),
            identity_roles: Vec::new(),
            arguments: None,
            dest_url: None,
            dest_domain: None,
            dest_ip: None,
            dest_port: None,
            dest_scheme: None,
            dest_path: None,
            dest_command: None,
            framework: None,
            gateway: None,
            session_id: None,
        }
    }
}

impl CanonicalAction {
    /// Convenience constructor for MCP tool calls.
    pub fn tool_call(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let mut action = Self {
            action_type: ActionType::ToolCall,
            action_name: name.into(),
            protocol: Protocol::Mcp,
            arguments: Some(arguments),
            ..Self::default()
        };
        action.normalize();
        action
    }

    /// Convenience constructor for egress checks.
    pub fn outbound(domain: impl Into<String>, port: u16) -> Self {
        let domain = domain.into();
        let mut action = Self {
            action_type: ActionType::OutboundConnect,
            action_name: format!("connect:{domain}"),
            protocol: Protocol::Http,
            dest_domain: Some(domain),
            dest_port: Some(port),
            ..Self::default()
        };
        action.normalize();
        action
    }

    /// Fill derivable fields so every consumer sees a total value:
    /// missing `request_id` gets a fresh UUID, `action_name`/`tool_name`
    /// are reconciled, and MCP tool calls always carry an arguments map
    /// (possibly empty).
    pub fn normalize(&mut self) {
        if self.request_id.is_empty() {
            self.request_id = Uuid::new_v4().to_string();
        }
        if self.action_name.is_empty() {
            if let Some(tool) = &self.tool_name {
                self.action_name = tool.clone();
            }
        }
        if self.tool_name.is_none() && self.protocol == Protocol::Mcp {
            self.tool_name = Some(self.action_name.clone());
        }
        if self.protocol == Protocol::Mcp
            && self.action_type == ActionType::ToolCall
            && self.arguments.is_none()
        {
            self.arguments = Some(Map::new());
        }
        // Derive the domain from the URL when the adapter only set the URL.
        if self.dest_domain.is_none() {
            if let Some(url) = &self.dest_url {
                self.dest_domain = host_of(url).map(str::to_owned);
            }
        }
    }

    /// True when the action names an egress destination the outbound
    /// stage can check.
    pub fn has_destination(&self) -> bool {
        self.dest_domain.is_some() || self.dest_ip.is_some()
    }
}

/// Extract the host portion of a URL-ish string without a URL parser:
/// strips scheme, userinfo, port, and path.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let rest = rest.split(['/', '?', '#']).next()?;
    let rest = rest.rsplit_once('@').map_or(rest, |(_, r)| r);
    // IPv6 literals keep their brackets; everything else drops the port.
    let host = if rest.starts_with('[') {
        rest.split(']').next().map(|h| h.trim_start_matches('['))?
    } else {
        rest.split(':').next()?
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_gets_request_id_and_arguments() {
        let action = CanonicalAction::tool_call("read_file", Map::new());
        assert!(!action.request_id.is_empty());
        assert_eq!(action.tool_name.as_deref(), Some("read_file"));
        assert!(action.arguments.is_some());
    }

    #[test]
    fn normalize_copies_tool_name_into_action_name() {
        let mut action = CanonicalAction {
            tool_name: Some("delete_file".into()),
            ..CanonicalAction::default()
        };
        action.normalize();
        assert_eq!(action.action_name, "delete_file");
    }

    #[test]
    fn normalize_derives_domain_from_url() {
        let mut action = CanonicalAction {
            action_type: ActionType::HttpRequest,
            protocol: Protocol::Http,
            dest_url: Some("https://user@api.example.com:8443/v1/x?q=1".into()),
            ..CanonicalAction::default()
        };
        action.normalize();
        assert_eq!(action.dest_domain.as_deref(), Some("api.example.com"));
    }

    #[test]
    fn host_of_handles_ipv6_literal() {
        assert_eq!(host_of("http://[::1]:8080/x"), Some("::1"));
    }

    #[test]
    fn host_of_rejects_empty() {
        assert_eq!(host_of("https:///path"), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let action: CanonicalAction =
            serde_json::from_str(r#"{"action_name": "read_file"}"#).unwrap();
        assert_eq!(action.action_type, ActionType::ToolCall);
        assert_eq!(action.protocol, Protocol::Mcp);
        assert!(action.identity_roles.is_empty());
    }
}
