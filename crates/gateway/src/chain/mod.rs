//! The interceptor chain — the per-flow pipeline every canonical action
//! passes through.
//!
//! Stages run strictly in declared order; any stage may short-circuit
//! with a deny, an allow decision is carried forward and can still be
//! overridden by a later stage (outbound control), and the audit record
//! is written unconditionally as a deferred final step that sees the
//! eventual outcome. The stage list itself is an atomically swapped
//! snapshot, so admin mutations never tear an in-flight request.

pub mod identity;
pub mod outbound;
pub mod policy;
pub mod scan;
pub mod tool_security;

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sg_domain::model::AuditRecord;
use sg_domain::{CanonicalAction, Decision, DefaultPolicy, Error, Result};
use sg_policy::SharedRuleSet;

use crate::runtime::audit::AuditStore;
use crate::runtime::rate_limit::RateLimiter;
use crate::state::GatewayState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interceptor contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-request context threaded alongside the action.
#[derive(Clone)]
pub struct ChainContext {
    /// Source address for rate limiting; `None` for in-process callers.
    pub client_ip: Option<IpAddr>,
    /// Cooperative cancellation; an aborted request is audited as
    /// `cancelled`, never as a policy decision.
    pub cancel: CancellationToken,
    /// `false` = submit-and-poll: an approval-gated request returns the
    /// non-terminal decision instead of blocking on the admin signal.
    pub wait_for_approval: bool,
}

impl ChainContext {
    pub fn local() -> Self {
        Self {
            client_ip: None,
            cancel: CancellationToken::new(),
            wait_for_approval: true,
        }
    }
}

/// One pipeline stage. Stages may transform the action in place;
/// returning `Some(decision)` either short-circuits (deny) or records
/// the decision and lets later stages run (allow).
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn intercept(
        &self,
        action: &mut CanonicalAction,
        cx: &ChainContext,
    ) -> Result<Option<Decision>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The immutable stage configuration published to the chain.
pub struct ChainStages {
    pub pipeline: Vec<Arc<dyn Interceptor>>,
    /// Response-scan seam used by adapters after the upstream call.
    pub response_scan: Option<scan::ResponseScan>,
}

pub struct Chain {
    stages: ArcSwap<ChainStages>,
    audit: Arc<AuditStore>,
    rate_limiter: Arc<RateLimiter>,
    rules: Arc<SharedRuleSet>,
}

impl Chain {
    pub fn new(
        audit: Arc<AuditStore>,
        rate_limiter: Arc<RateLimiter>,
        rules: Arc<SharedRuleSet>,
    ) -> Self {
        Self {
            stages: ArcSwap::from_pointee(ChainStages {
                pipeline: Vec::new(),
                response_scan: None,
            }),
            audit,
            rate_limiter,
            rules,
        }
    }

    /// Swap in a new stage list. In-flight requests keep the old one.
    pub fn reconfigure(&self, stages: ChainStages) {
        self.stages.store(Arc::new(stages));
    }

    /// Run an action through the pipeline to a terminal (or, for
    /// submit-and-poll approval flows, pending) decision, and audit it.
    pub async fn run(&self, mut action: CanonicalAction, cx: &ChainContext) -> Result<Decision> {
        action.normalize();

        if let Some(ip) = cx.client_ip {
            if !self.rate_limiter.check(ip) {
                let decision =
                    Decision::deny(format!("rate limit exceeded for {ip}"));
                self.audit.append(AuditRecord::decided(&action, &decision));
                return Err(Error::RateLimited(decision.reason));
            }
        }

        let stages = self.stages.load_full();
        let mut current: Option<Decision> = None;

        for stage in &stages.pipeline {
            if cx.cancel.is_cancelled() {
                self.audit.append(AuditRecord::cancelled(&action));
                return Err(Error::Cancelled);
            }
            match stage.intercept(&mut action, cx).await {
                Ok(None) => {}
                Ok(Some(decision)) => {
                    let short_circuit = !decision.allowed;
                    let pending = !decision.terminal;
                    current = Some(decision);
                    if short_circuit || pending {
                        break;
                    }
                }
                Err(Error::Cancelled) => {
                    self.audit.append(AuditRecord::cancelled(&action));
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    // A malfunctioning stage must not panic the request:
                    // fail open or closed per the default policy.
                    tracing::error!(stage = stage.name(), error = %e, "stage failed");
                    let decision = match self.rules.snapshot().default_policy() {
                        DefaultPolicy::Allow => {
                            Decision::allow(format!("stage '{}' failed; default allow", stage.name()))
                        }
                        DefaultPolicy::Deny => {
                            Decision::deny(format!("stage '{}' failed; default deny", stage.name()))
                        }
                    };
                    current = Some(decision);
                    break;
                }
            }
        }

        let decision = current.unwrap_or_else(|| {
            Decision::allow("no interceptor produced a decision")
        });

        // Deferred audit: runs for every outcome, pending approvals
        // excepted — those are audited when they resolve.
        if decision.terminal {
            self.audit.append(AuditRecord::decided(&action, &decision));
        }
        Ok(decision)
    }

    /// Scan upstream response content on behalf of an adapter. Returns a
    /// deny decision (audited) in enforce mode; findings in monitor mode
    /// are logged only.
    pub fn scan_response(&self, action: &CanonicalAction, content: &str) -> Option<Decision> {
        let stages = self.stages.load_full();
        let response_scan = stages.response_scan.as_ref()?;
        let decision = response_scan.check(action, content)?;
        self.audit.append(AuditRecord::decided(action, &decision));
        Some(decision)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the canonical stage list from the current document: identity
/// resolve → tool security → request scan → policy evaluate → outbound
/// control. Called at boot and after every control-plane mutation.
pub fn build_stages(gs: &GatewayState) -> ChainStages {
    let (identities, quarantined, scanning) = {
        let doc = gs.state.doc.read();
        (
            Arc::new(doc.identities.clone()),
            Arc::new(doc.quarantined_tools.clone()),
            doc.content_scanning.clone(),
        )
    };

    let mut pipeline: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(identity::IdentityResolve::new(identities)),
        Arc::new(tool_security::ToolSecurity::new(quarantined)),
    ];

    if scanning.enabled {
        pipeline.push(Arc::new(scan::RequestScan::new(
            Arc::clone(&gs.scanners.request),
            scanning.enforce,
        )));
    }

    pipeline.push(Arc::new(policy::PolicyEvaluate::new(
        Arc::clone(&gs.rules),
        Arc::clone(&gs.approvals),
        Arc::clone(&gs.state),
    )));
    pipeline.push(Arc::new(outbound::OutboundControl::new(Arc::clone(
        &gs.rules,
    ))));

    let response_scan = scanning.enabled.then(|| {
        scan::ResponseScan::new(Arc::clone(&gs.scanners.response), scanning.enforce)
    });

    ChainStages {
        pipeline,
        response_scan,
    }
}
