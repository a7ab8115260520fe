//! Shared gateway state passed to all API handlers and chain stages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use sg_domain::config::Config;
use sg_domain::model::AppState;
use sg_domain::{Error, Result};
use sg_policy::{RuleSet, SharedRuleSet};
use sg_store::StateStore;

use crate::chain::scan::Scanners;
use crate::chain::Chain;
use crate::runtime::approval::ApprovalCoordinator;
use crate::runtime::audit::AuditStore;
use crate::runtime::rate_limit::RateLimiter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateHandle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The in-memory authoritative copy of the persisted document plus the
/// machinery to mutate it safely: a control-plane mutex serializing all
/// mutations and the durable store behind them.
pub struct StateHandle {
    pub store: Arc<StateStore>,
    pub doc: RwLock<AppState>,
    control: tokio::sync::Mutex<()>,
}

impl StateHandle {
    pub fn new(store: Arc<StateStore>, doc: AppState) -> Self {
        Self {
            store,
            doc: RwLock::new(doc),
            control: tokio::sync::Mutex::new(()),
        }
    }

    /// Apply a mutation: copy the document, run `f` on the copy, persist
    /// durably off the async runtime, then commit the copy in memory.
    /// A failed save leaves both memory and disk on the previous state.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut AppState) -> Result<T> + Send,
    {
        let _guard = self.control.lock().await;
        let mut draft = self.doc.read().clone();
        let out = f(&mut draft)?;

        let store = Arc::clone(&self.store);
        let to_save = draft.clone();
        let updated_at = tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .map_err(|e| Error::Persistence(format!("save task panicked: {e}")))??;

        draft.updated_at = updated_at;
        *self.doc.write() = draft;
        Ok(out)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GatewayState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared application state. Cloned into every handler; all fields are
/// `Arc`s of services.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub state: Arc<StateHandle>,
    pub rules: Arc<SharedRuleSet>,
    pub chain: Arc<Chain>,
    pub approvals: Arc<ApprovalCoordinator>,
    pub audit: Arc<AuditStore>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Precompiled request/response content scanners.
    pub scanners: Arc<Scanners>,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    /// Run a control-plane mutation and republish the derived snapshots
    /// (rule set and chain stages) so requests started after this call
    /// observe it.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut AppState) -> Result<T> + Send,
    {
        let out = self.state.mutate(f).await?;
        self.republish();
        Ok(out)
    }

    /// Rebuild and atomically publish the rule-set snapshot and the
    /// interceptor stage list from the current document. In-flight
    /// requests finish against whatever they loaded.
    pub fn republish(&self) {
        let snapshot = {
            let doc = self.state.doc.read();
            RuleSet::build(&doc)
        };
        for diagnostic in snapshot.diagnostics() {
            tracing::error!(
                rule_id = %diagnostic.rule_id,
                rule = %diagnostic.rule_name,
                error = %diagnostic.error,
                "rule disabled by compile error"
            );
        }
        self.rules.publish(snapshot);
        let stages = crate::chain::build_stages(self);
        self.chain.reconfigure(stages);
    }
}
