//! Decisions — the terminal (or approval-pending) outcome of evaluating a
//! canonical action against the active rule set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a matching rule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    ApprovalRequired,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::ApprovalRequired => "approval_required",
        }
    }
}

/// The terminal action applied when an approval deadline passes without a
/// human signal. Deliberately cannot express `approval_required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    Allow,
    #[default]
    Deny,
}

/// The gateway-wide fallback when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    #[default]
    Allow,
    Deny,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one evaluation.
///
/// `terminal = false` only for `approval_required` results that still
/// await a human signal; the interceptor chain converts those into a
/// terminal allow/deny before the caller sees them (unless the caller
/// explicitly opted into submit-and-poll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub terminal: bool,
    pub action: RuleAction,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: String,
    pub reason: String,
    #[serde(default)]
    pub latency_us: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            terminal: true,
            action: RuleAction::Allow,
            rule_id: String::new(),
            rule_name: String::new(),
            reason: reason.into(),
            latency_us: 0,
            approval_id: None,
            approval_deadline: None,
            help_url: None,
            help_text: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            action: RuleAction::Deny,
            ..Self::allow(reason)
        }
    }

    /// Attach the rule that produced this decision.
    pub fn with_rule(mut self, rule_id: impl Into<String>, rule_name: impl Into<String>) -> Self {
        self.rule_id = rule_id.into();
        self.rule_name = rule_name.into();
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_is_terminal() {
        let d = Decision::allow("matched rule 'x'");
        assert!(d.allowed);
        assert!(d.terminal);
        assert_eq!(d.action, RuleAction::Allow);
    }

    #[test]
    fn deny_flips_allowed_only() {
        let d = Decision::deny("blocked");
        assert!(!d.allowed);
        assert!(d.terminal);
        assert_eq!(d.action, RuleAction::Deny);
    }

    #[test]
    fn serializes_snake_case_actions() {
        let v = serde_json::to_value(RuleAction::ApprovalRequired).unwrap();
        assert_eq!(v, serde_json::json!("approval_required"));
    }

    #[test]
    fn timeout_action_defaults_to_deny() {
        assert_eq!(TimeoutAction::default(), TimeoutAction::Deny);
    }
}
