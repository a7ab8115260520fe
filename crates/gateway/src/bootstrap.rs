//! GatewayState construction and background-task spawning.
//!
//! `build_gateway_state` is the shared boot path: load (or initialize)
//! the persisted state, rebuild derived snapshots, recover pending
//! approvals, wire the chain. `spawn_background_tasks` starts the
//! long-running tickers.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use sg_domain::config::{Config, ConfigSeverity};
use sg_policy::{RuleSet, SharedRuleSet};
use sg_store::StateStore;

use crate::chain::scan::Scanners;
use crate::chain::Chain;
use crate::defaults;
use crate::runtime::approval::{resolution_record, ApprovalCoordinator};
use crate::runtime::audit::AuditStore;
use crate::runtime::rate_limit::RateLimiter;
use crate::state::{GatewayState, StateHandle};

/// Validate config, load state, and wire every subsystem into a
/// [`GatewayState`].
pub async fn build_gateway_state(config: Arc<Config>) -> anyhow::Result<GatewayState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── State store ──────────────────────────────────────────────────
    let store = Arc::new(StateStore::new(config.store.state_path.clone()));
    let fresh = !store.exists();
    let mut doc = match store.load() {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(error = %e, "state file corrupt; attempting backup");
            store
                .load_backup()
                .context("state file corrupt and no usable backup")?
        }
    };
    if fresh {
        doc.default_policy = config.policy.default_policy;
        doc.content_scanning.enabled = config.scanning.enabled;
        doc.content_scanning.enforce =
            config.scanning.mode == sg_domain::config::ScanMode::Enforce;
        if config.policy.seed_defaults {
            defaults::seed(&mut doc);
            tracing::info!("bundled default protections installed");
        }
        let store_for_init = Arc::clone(&store);
        let to_save = doc.clone();
        doc.updated_at = tokio::task::spawn_blocking(move || store_for_init.save(&to_save))
            .await
            .context("initial state save task")??;
    }
    tracing::info!(
        path = %store.path().display(),
        policies = doc.policies.len(),
        identities = doc.identities.len(),
        "state loaded"
    );

    // ── Derived snapshots ────────────────────────────────────────────
    let initial = RuleSet::build(&doc);
    for diagnostic in initial.diagnostics() {
        tracing::error!(
            rule_id = %diagnostic.rule_id,
            rule = %diagnostic.rule_name,
            error = %diagnostic.error,
            "rule disabled by compile error at load"
        );
    }
    let rules = Arc::new(SharedRuleSet::new(initial));
    tracing::info!("rule set snapshot published");

    // ── Approval coordinator (recover pending mirrors) ───────────────
    let approvals = Arc::new(ApprovalCoordinator::new());
    let mut recovered = 0usize;
    for approval in &doc.pending_approvals {
        if !approval.status.is_terminal() {
            approvals.restore(approval.clone());
            recovered += 1;
        }
    }
    if recovered > 0 {
        tracing::info!(count = recovered, "pending approvals recovered from state");
    }

    // ── Audit store (preload evaluation history) ────────────────────
    let audit = Arc::new(AuditStore::new());
    audit.preload(&doc.policy_evaluations);
    tracing::info!(records = audit.len(), "audit window preloaded");

    // ── Rate limiter ─────────────────────────────────────────────────
    let rate_limit_config = config.server.rate_limit.clone().unwrap_or_default();
    let rate_limiter = Arc::new(RateLimiter::new(&rate_limit_config));
    match &config.server.rate_limit {
        Some(rl) => tracing::info!(
            max_requests = rl.max_requests,
            window_secs = rl.window_secs,
            "per-IP rate limiting enabled"
        ),
        None => tracing::info!("per-IP rate limiting at defaults (loopback is always exempt)"),
    }

    // ── Content scanners (compiled once) ─────────────────────────────
    let scanners = Arc::new(
        Scanners::from_config(&config.scanning)
            .map_err(|e| anyhow::anyhow!("compiling scan patterns: {e}"))?,
    );
    tracing::info!(
        request_patterns = config.scanning.request_patterns.len(),
        response_patterns = config.scanning.response_patterns.len(),
        "content scanners compiled"
    );

    // ── Chain + state handle ─────────────────────────────────────────
    let chain = Arc::new(Chain::new(
        Arc::clone(&audit),
        Arc::clone(&rate_limiter),
        Arc::clone(&rules),
    ));
    let state_handle = Arc::new(StateHandle::new(Arc::clone(&store), doc));

    let gateway = GatewayState {
        config,
        state: state_handle,
        rules,
        chain,
        approvals,
        audit,
        rate_limiter,
        scanners,
        started_at: Utc::now(),
    };

    // Publish the initial stage list.
    gateway.republish();
    tracing::info!("interceptor chain ready");

    Ok(gateway)
}

/// Spawn the long-running tokio tasks: approval expiry ticker, audit
/// flush, rate-limit sweep.
pub fn spawn_background_tasks(state: &GatewayState) {
    // ── Approval expiry ticker (1s) ──────────────────────────────────
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                let expired = state.approvals.expire_due(Utc::now());
                for approval in expired {
                    tracing::info!(
                        approval_id = %approval.id,
                        action = %approval.action_name,
                        "approval expired"
                    );
                    if !state.approvals.caller_waits(approval.id) {
                        state.audit.append(resolution_record(&approval));
                    }
                    let mirror = approval.clone();
                    if let Err(e) = state
                        .state
                        .mutate(move |doc| {
                            doc.mirror_approval(mirror);
                            Ok(())
                        })
                        .await
                    {
                        tracing::warn!(error = %e, "failed to mirror expired approval");
                    }
                }
                // Terminal entries older than an hour only live in the
                // durable mirror.
                state
                    .approvals
                    .prune_resolved(Utc::now() - chrono::Duration::hours(1));
            }
        });
    }

    // ── Audit flush (write-behind of the evaluation window) ──────────
    {
        let state = state.clone();
        let interval_secs = state.config.store.flush_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if let Some(records) = state.audit.take_for_flush() {
                    let result = state
                        .state
                        .mutate(move |doc| {
                            doc.policy_evaluations = records;
                            Ok(())
                        })
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "audit flush failed");
                    }
                }
            }
        });
    }

    // ── Rate-limit window sweep (60s) ────────────────────────────────
    {
        let rate_limiter = Arc::clone(&state.rate_limiter);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                rate_limiter.sweep();
            }
        });
    }

    tracing::info!("background tasks spawned");
}
