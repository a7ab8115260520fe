//! The root persisted document.
//!
//! `AppState` is the single source of truth on disk: rules, identities,
//! keys, baselines, approval mirror, and a bounded window of recent
//! evaluations. The state store owns serialization and durability; this
//! module owns the shape and the in-memory accessors.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::DefaultPolicy;
use crate::error::{Error, Result};
use crate::model::approval::PendingApproval;
use crate::model::audit::AuditRecord;
use crate::model::baseline::ToolBaseline;
use crate::model::identity::{ApiKey, Identity};
use crate::model::policy::{OutboundRule, Policy};

/// Current on-disk schema version.
pub const STATE_SCHEMA_VERSION: &str = "1";

/// Maximum number of evaluation records retained for status queries.
pub const MAX_POLICY_EVALUATIONS: usize = 1000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embedded settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Content-scanning switch persisted with the state (toggled live from
/// the admin surface, not only from the config file).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentScanning {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub enforce: bool,
}

/// TLS-inspection settings consumed by the (out-of-core) MITM forge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsInspection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bypass_domains: Vec<String>,
}

/// A named reverse-proxy upstream for the HTTP gateway flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayTarget {
    pub name: String,
    pub upstream_url: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AppState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    pub version: String,
    #[serde(default)]
    pub default_policy: DefaultPolicy,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub outbound_rules: Vec<OutboundRule>,
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    /// Mirror of the approval coordinator's map, kept for recovery and
    /// post-hoc inspection.
    #[serde(default)]
    pub pending_approvals: Vec<PendingApproval>,
    #[serde(default)]
    pub tool_baselines: BTreeMap<String, ToolBaseline>,
    #[serde(default)]
    pub quarantined_tools: BTreeSet<String>,
    #[serde(default)]
    pub content_scanning: ContentScanning,
    #[serde(default)]
    pub tls_inspection: TlsInspection,
    #[serde(default)]
    pub http_gateway_targets: Vec<HttpGatewayTarget>,
    /// Bounded FIFO of recent terminal decisions (newest last).
    #[serde(default)]
    pub policy_evaluations: Vec<AuditRecord>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AppState {
    /// The state a fresh install starts from: schema `"1"`, default
    /// allow, empty collections.
    pub fn default_state() -> Self {
        let now = Utc::now();
        Self {
            version: STATE_SCHEMA_VERSION.to_owned(),
            default_policy: DefaultPolicy::Allow,
            policies: Vec::new(),
            outbound_rules: Vec::new(),
            identities: Vec::new(),
            api_keys: Vec::new(),
            pending_approvals: Vec::new(),
            tool_baselines: BTreeMap::new(),
            quarantined_tools: BTreeSet::new(),
            content_scanning: ContentScanning::default(),
            tls_inspection: TlsInspection::default(),
            http_gateway_targets: Vec::new(),
            policy_evaluations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn policy(&self, id: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id == id)
    }

    pub fn policy_mut(&mut self, id: &str) -> Option<&mut Policy> {
        self.policies.iter_mut().find(|p| p.id == id)
    }

    pub fn identity(&self, id: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.id == id)
    }

    pub fn identity_by_name(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    pub fn outbound_rule(&self, id: &str) -> Option<&OutboundRule> {
        self.outbound_rules.iter().find(|r| r.id == id)
    }

    // ── Mutations with invariants ────────────────────────────────────

    /// Insert an identity, enforcing case-sensitive name uniqueness.
    pub fn add_identity(&mut self, identity: Identity) -> Result<()> {
        identity.validate()?;
        if self.identity_by_name(&identity.name).is_some() {
            return Err(Error::Conflict(format!(
                "identity name '{}' already exists",
                identity.name
            )));
        }
        self.identities.push(identity);
        Ok(())
    }

    /// Append a terminal evaluation record, evicting the oldest past the
    /// retention cap.
    pub fn push_evaluation(&mut self, record: AuditRecord) {
        self.policy_evaluations.push(record);
        if self.policy_evaluations.len() > MAX_POLICY_EVALUATIONS {
            let excess = self.policy_evaluations.len() - MAX_POLICY_EVALUATIONS;
            self.policy_evaluations.drain(..excess);
        }
    }

    /// Upsert the mirror entry for a pending approval.
    pub fn mirror_approval(&mut self, approval: PendingApproval) {
        match self
            .pending_approvals
            .iter_mut()
            .find(|a| a.id == approval.id)
        {
            Some(existing) => *existing = approval,
            None => self.pending_approvals.push(approval),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
