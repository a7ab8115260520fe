//! Outbound control stage — egress checks for actions that name a
//! destination.

use std::sync::Arc;

use async_trait::async_trait;

use sg_domain::{CanonicalAction, Decision, Result};
use sg_policy::{evaluate_outbound, Destination, EgressVerdict, SharedRuleSet};

use super::{ChainContext, Interceptor};

pub struct OutboundControl {
    rules: Arc<SharedRuleSet>,
}

impl OutboundControl {
    pub fn new(rules: Arc<SharedRuleSet>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Interceptor for OutboundControl {
    fn name(&self) -> &'static str {
        "outbound_control"
    }

    async fn intercept(
        &self,
        action: &mut CanonicalAction,
        _cx: &ChainContext,
    ) -> Result<Option<Decision>> {
        if !action.has_destination() {
            return Ok(None);
        }

        let snapshot = self.rules.snapshot();
        let dest = Destination {
            domain: action.dest_domain.as_deref(),
            ip: action.dest_ip.as_deref(),
            port: action.dest_port,
        };

        match evaluate_outbound(snapshot.outbound(), dest) {
            EgressVerdict::Blocked {
                rule_id,
                rule_name,
                reason,
                ..
            } => Ok(Some(Decision::deny(reason).with_rule(rule_id, rule_name))),
            EgressVerdict::Allowed { findings } => {
                for finding in findings {
                    tracing::warn!(
                        request_id = %action.request_id,
                        rule = %finding.rule_name,
                        target = %finding.matched_target,
                        action = ?finding.action,
                        "outbound rule finding"
                    );
                }
                Ok(None)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sg_domain::model::{
        AppState, OutboundAction, OutboundMode, OutboundRule, OutboundTarget, TargetType,
    };
    use sg_policy::RuleSet;

    fn shared_with_blocklist() -> Arc<SharedRuleSet> {
        let mut rule =
            OutboundRule::new("tunnels", OutboundMode::Blocklist, OutboundAction::Block);
        rule.targets.push(OutboundTarget {
            target_type: TargetType::DomainGlob,
            value: "*.ngrok.io".into(),
        });
        let mut state = AppState::default_state();
        state.outbound_rules.push(rule);
        Arc::new(SharedRuleSet::new(RuleSet::build(&state)))
    }

    #[tokio::test]
    async fn blocks_matching_destination() {
        let stage = OutboundControl::new(shared_with_blocklist());
        let mut action = CanonicalAction::outbound("abc.ngrok.io", 443);
        let decision = stage
            .intercept(&mut action, &ChainContext::local())
            .await
            .unwrap()
            .expect("blocklist must decide");
        assert!(!decision.allowed);
        assert_eq!(decision.rule_name, "tunnels");
    }

    #[tokio::test]
    async fn passes_unrelated_destination() {
        let stage = OutboundControl::new(shared_with_blocklist());
        let mut action = CanonicalAction::outbound("github.com", 443);
        assert!(stage
            .intercept(&mut action, &ChainContext::local())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn skips_actions_without_destination() {
        let stage = OutboundControl::new(shared_with_blocklist());
        let mut action = CanonicalAction::tool_call("read_file", serde_json::Map::new());
        assert!(stage
            .intercept(&mut action, &ChainContext::local())
            .await
            .unwrap()
            .is_none());
    }
}
