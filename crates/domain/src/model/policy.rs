//! Policies, rules, and outbound (egress) rules.
//!
//! A `Policy` is an ordered, named collection of `Rule`s; both carry an
//! integer priority where **lower sorts earlier**. `OutboundRule` is the
//! separate egress-control family matched on destinations rather than
//! expressions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{RuleAction, TimeoutAction};
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rule
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One condition-action line inside a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub priority: i32,
    /// Glob over the action name (`read_*`, `*`). Anchored; `*`/`?` only.
    pub tool_match: String,
    /// Boolean CEL expression over the canonical-action schema.
    pub condition: String,
    pub action: RuleAction,
    /// Required when `action` is `approval_required`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timeout_secs: Option<u64>,
    #[serde(default)]
    pub timeout_action: TimeoutAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(name: impl Into<String>, tool_match: impl Into<String>, condition: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            priority: 100,
            tool_match: tool_match.into(),
            condition: condition.into(),
            action,
            approval_timeout_secs: None,
            timeout_action: TimeoutAction::default(),
            help_url: None,
            help_text: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Structural validation. Expression compilation is checked separately
    /// by the policy engine, which owns the expression language.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("rule name must not be empty".into()));
        }
        if self.tool_match.is_empty() {
            return Err(Error::Validation(format!(
                "rule '{}': tool_match must not be empty",
                self.name
            )));
        }
        if self.condition.trim().is_empty() {
            return Err(Error::Validation(format!(
                "rule '{}': condition must not be empty",
                self.name
            )));
        }
        if self.action == RuleAction::ApprovalRequired {
            match self.approval_timeout_secs {
                Some(secs) if secs > 0 => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "rule '{}': approval_required needs approval_timeout_secs > 0",
                        self.name
                    )))
                }
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An ordered collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: i32,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Bundled defaults cannot be mutated except for `enabled`.
    #[serde(default)]
    pub read_only: bool,
}

impl Policy {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            priority,
            enabled: true,
            rules: Vec::new(),
            created_at: now,
            updated_at: now,
            read_only: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("policy name must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::Validation(format!(
                    "policy '{}': duplicate rule id {}",
                    self.name, rule.id
                )));
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundMode {
    Blocklist,
    Allowlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Domain,
    Ip,
    Cidr,
    DomainGlob,
    PortRange,
}

/// One matchable destination inside an outbound rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub value: String,
}

/// What a matching blocklist rule does. `alert` and `log` record a
/// finding without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundAction {
    Block,
    Alert,
    Log,
}

/// Egress-control rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRule {
    pub id: String,
    pub name: String,
    pub mode: OutboundMode,
    pub targets: Vec<OutboundTarget>,
    pub action: OutboundAction,
    pub priority: i32,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl OutboundRule {
    pub fn new(name: impl Into<String>, mode: OutboundMode, action: OutboundAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            mode,
            targets: Vec::new(),
            action,
            priority: 100,
            enabled: true,
            read_only: false,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("outbound rule name must not be empty".into()));
        }
        if self.targets.is_empty() {
            return Err(Error::Validation(format!(
                "outbound rule '{}': at least one target required",
                self.name
            )));
        }
        for target in &self.targets {
            if target.value.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "outbound rule '{}': empty target value",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
