//! Policy evaluate stage — ordered rule matching plus the approval
//! hand-off.
//!
//! A terminal allow/deny comes straight back from the evaluator. An
//! `approval_required` match parks the request on the coordinator:
//! blocking callers wait for the terminal transition (approve, deny, or
//! deadline) and receive the resolved decision; submit-and-poll callers
//! get the non-terminal decision carrying the approval id.

use std::sync::Arc;

use async_trait::async_trait;

use sg_domain::model::{ApprovalStatus, PendingApproval};
use sg_domain::{CanonicalAction, Decision, Error, Result, RuleAction, TimeoutAction};
use sg_policy::SharedRuleSet;

use crate::runtime::approval::ApprovalCoordinator;
use crate::state::StateHandle;

use super::{ChainContext, Interceptor};

pub struct PolicyEvaluate {
    rules: Arc<SharedRuleSet>,
    approvals: Arc<ApprovalCoordinator>,
    state: Arc<StateHandle>,
}

impl PolicyEvaluate {
    pub fn new(
        rules: Arc<SharedRuleSet>,
        approvals: Arc<ApprovalCoordinator>,
        state: Arc<StateHandle>,
    ) -> Self {
        Self {
            rules,
            approvals,
            state,
        }
    }

    /// Mirror an approval entry into the persisted state. Failure is
    /// logged, not fatal — the coordinator remains authoritative for the
    /// in-flight request.
    async fn mirror(&self, approval: PendingApproval) {
        let result = self
            .state
            .mutate(move |doc| {
                doc.mirror_approval(approval);
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to mirror approval to state");
        }
    }
}

#[async_trait]
impl Interceptor for PolicyEvaluate {
    fn name(&self) -> &'static str {
        "policy_evaluate"
    }

    async fn intercept(
        &self,
        action: &mut CanonicalAction,
        cx: &ChainContext,
    ) -> Result<Option<Decision>> {
        let snapshot = self.rules.snapshot();
        let decision = sg_policy::evaluate(&snapshot, action);
        if decision.action != RuleAction::ApprovalRequired {
            return Ok(Some(decision));
        }

        let deadline = decision
            .approval_deadline
            .unwrap_or_else(chrono::Utc::now);
        // Timeout semantics were captured by the rule that matched; a
        // later edit must not change this entry.
        let timeout_action = snapshot
            .rule(&decision.rule_id)
            .map(|r| r.timeout_action)
            .unwrap_or_default();

        let approval =
            self.approvals
                .create(action, deadline, timeout_action, cx.wait_for_approval);
        tracing::info!(
            approval_id = %approval.id,
            request_id = %action.request_id,
            action = %action.action_name,
            deadline = %deadline,
            "approval required; awaiting admin signal"
        );
        self.mirror(approval.clone()).await;

        if !cx.wait_for_approval {
            let mut pending = decision;
            pending.approval_id = Some(approval.id);
            return Ok(Some(pending));
        }

        let resolved = tokio::select! {
            resolved = self.approvals.await_decision(approval.id) => resolved?,
            () = cx.cancel.cancelled() => {
                // The entry stays pending and will expire normally.
                return Err(Error::Cancelled);
            }
        };
        self.mirror(resolved.clone()).await;

        Ok(Some(resolution_decision(&decision, &resolved)))
    }
}

/// Map a terminal approval entry onto the final decision, preserving the
/// matched rule's identity and help metadata from the original
/// (non-terminal) decision.
pub fn resolution_decision(original: &Decision, approval: &PendingApproval) -> Decision {
    let mut decision = match approval.status {
        ApprovalStatus::Approved => Decision::allow("approved by admin"),
        ApprovalStatus::Denied => match &approval.reason {
            Some(reason) => Decision::deny(format!("denied by admin: {reason}")),
            None => Decision::deny("denied by admin"),
        },
        ApprovalStatus::Expired => {
            let timeout_secs = (approval.deadline - approval.created_at).num_seconds();
            match approval.timeout_action {
                TimeoutAction::Allow => Decision::allow(format!(
                    "approval timed out after {timeout_secs}s; timeout action allow"
                )),
                TimeoutAction::Deny => Decision::deny(format!(
                    "approval timed out after {timeout_secs}s"
                )),
            }
        }
        ApprovalStatus::Pending => Decision::deny("approval still pending"),
    };
    decision.rule_id = original.rule_id.clone();
    decision.rule_name = original.rule_name.clone();
    decision.latency_us = original.latency_us;
    if !decision.allowed {
        decision.help_url = original.help_url.clone();
        decision.help_text = original.help_text.clone();
    }
    decision.approval_id = Some(approval.id);
    decision
}
