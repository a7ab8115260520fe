//! Ordered rule matching — canonical action in, decision out.

use std::time::Instant;

use chrono::{Duration, Utc};

use sg_domain::{CanonicalAction, Decision, DefaultPolicy, RuleAction};

use crate::expr;
use crate::glob::glob_match;
use crate::rules::RuleSet;

/// Evaluate an action against a rule-set snapshot.
///
/// The first matching rule wins: policies in priority order, rules in
/// priority order within each, `tool_match` glob first, then the
/// condition. Eval errors demote the rule to non-matching for this
/// request (with a warning) and the walk continues. No match falls
/// through to the snapshot's default policy.
pub fn evaluate(snapshot: &RuleSet, action: &CanonicalAction) -> Decision {
    let started = Instant::now();

    for policy in snapshot.policies() {
        if !policy.enabled {
            continue;
        }
        for rule in &policy.rules {
            if !rule.enabled {
                continue;
            }
            if !glob_match(&rule.tool_match, &action.action_name) {
                continue;
            }
            // A condition missing from the cache was demoted at build
            // time; treat it as non-matching.
            let Some(compiled) = snapshot.compiled(&rule.condition) else {
                continue;
            };
            match expr::evaluate(compiled, action) {
                Ok(true) => {
                    let mut decision = decision_for(rule);
                    decision.latency_us = elapsed_us(started);
                    return decision;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        rule = %rule.name,
                        request_id = %action.request_id,
                        error = %e,
                        "condition eval failed; skipping rule"
                    );
                }
            }
        }
    }

    let mut decision = match snapshot.default_policy() {
        DefaultPolicy::Allow => Decision::allow("no matching rule; default allow"),
        DefaultPolicy::Deny => Decision::deny("no matching rule; default deny"),
    };
    decision.latency_us = elapsed_us(started);
    decision
}

fn decision_for(rule: &sg_domain::model::Rule) -> Decision {
    match rule.action {
        RuleAction::Allow => Decision::allow(format!("matched rule '{}'", rule.name))
            .with_rule(&rule.id, &rule.name),
        RuleAction::Deny => {
            let mut decision = Decision::deny(format!("matched rule '{}'", rule.name))
                .with_rule(&rule.id, &rule.name);
            decision.help_url = rule.help_url.clone();
            decision.help_text = rule.help_text.clone();
            decision
        }
        RuleAction::ApprovalRequired => {
            let timeout_secs = rule.approval_timeout_secs.unwrap_or(0);
            let mut decision = Decision {
                allowed: false,
                terminal: false,
                action: RuleAction::ApprovalRequired,
                approval_deadline: Some(
                    Utc::now() + Duration::seconds(timeout_secs as i64),
                ),
                ..Decision::deny(format!(
                    "matched rule '{}'; approval required",
                    rule.name
                ))
            };
            decision.rule_id = rule.id.clone();
            decision.rule_name = rule.name.clone();
            decision.help_url = rule.help_url.clone();
            decision.help_text = rule.help_text.clone();
            decision
        }
    }
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}
