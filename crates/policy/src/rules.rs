//! Rule-set snapshots.
//!
//! A `RuleSet` is an immutable value built from the persisted state:
//! policies and outbound rules sorted into evaluation order plus a
//! compile cache keyed by condition source. Snapshots are published via
//! an atomic pointer swap (`SharedRuleSet`); in-flight evaluations keep
//! whatever snapshot they started with and the read path takes no locks.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use sg_domain::model::{AppState, OutboundRule, Policy, Rule};
use sg_domain::{DefaultPolicy, Result};

use crate::expr::{self, CompiledExpr};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A rule that failed to compile while building a snapshot. The rule is
/// demoted to disabled in the snapshot; the rest of the state loads.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleDiagnostic {
    pub policy_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub error: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RuleSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct RuleSet {
    policies: Vec<Policy>,
    outbound: Vec<OutboundRule>,
    default_policy: DefaultPolicy,
    /// Compiled conditions keyed by source string; rules with identical
    /// conditions share one entry.
    cache: HashMap<String, Arc<CompiledExpr>>,
    diagnostics: Vec<RuleDiagnostic>,
}

impl RuleSet {
    /// Build a snapshot from the persisted state. Never fails: rules
    /// whose conditions do not compile are demoted to disabled and
    /// reported in `diagnostics`.
    pub fn build(state: &AppState) -> Self {
        let mut cache: HashMap<String, Arc<CompiledExpr>> = HashMap::new();
        let mut diagnostics = Vec::new();

        let mut policies = state.policies.clone();
        for policy in &mut policies {
            sort_rules(&mut policy.rules);
            for rule in &mut policy.rules {
                if !rule.enabled {
                    continue;
                }
                if cache.contains_key(&rule.condition) {
                    continue;
                }
                match expr::compile(&rule.condition) {
                    Ok(compiled) => {
                        cache.insert(rule.condition.clone(), Arc::new(compiled));
                    }
                    Err(e) => {
                        tracing::error!(
                            policy = %policy.name,
                            rule = %rule.name,
                            error = %e,
                            "rule condition failed to compile; rule disabled"
                        );
                        diagnostics.push(RuleDiagnostic {
                            policy_id: policy.id.clone(),
                            rule_id: rule.id.clone(),
                            rule_name: rule.name.clone(),
                            error: e.to_string(),
                        });
                        rule.enabled = false;
                    }
                }
            }
        }
        sort_policies(&mut policies);

        let mut outbound = state.outbound_rules.clone();
        outbound.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        Self {
            policies,
            outbound,
            default_policy: state.default_policy,
            cache,
            diagnostics,
        }
    }

    /// An empty snapshot with the given fallback — what a fresh gateway
    /// evaluates against before any state exists.
    pub fn empty(default_policy: DefaultPolicy) -> Self {
        Self {
            policies: Vec::new(),
            outbound: Vec::new(),
            default_policy,
            cache: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn outbound(&self) -> &[OutboundRule] {
        &self.outbound
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    pub fn diagnostics(&self) -> &[RuleDiagnostic] {
        &self.diagnostics
    }

    pub fn compiled(&self, condition: &str) -> Option<&Arc<CompiledExpr>> {
        self.cache.get(condition)
    }

    /// Find a rule anywhere in the snapshot by id.
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.policies
            .iter()
            .flat_map(|p| p.rules.iter())
            .find(|r| r.id == id)
    }
}

/// Priority ascending, then creation time, then id — a total order so
/// evaluation is deterministic.
fn sort_policies(policies: &mut [Policy]) {
    policies.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Full validation for an incoming rule: structural checks plus condition
/// compilation. Used by the admin surface before accepting a mutation.
pub fn validate_rule(rule: &Rule) -> Result<()> {
    rule.validate()?;
    expr::compile(&rule.condition)?;
    Ok(())
}

/// Full validation for an incoming policy.
pub fn validate_policy(policy: &Policy) -> Result<()> {
    policy.validate()?;
    for rule in &policy.rules {
        expr::compile(&rule.condition)?;
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SharedRuleSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The published snapshot pointer. Readers grab an `Arc` and keep it for
/// the duration of one evaluation; writers build a whole new snapshot
/// and swap.
pub struct SharedRuleSet {
    inner: ArcSwap<RuleSet>,
}

impl SharedRuleSet {
    pub fn new(initial: RuleSet) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.inner.load_full()
    }

    pub fn publish(&self, next: RuleSet) {
        self.inner.store(Arc::new(next));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sg_domain::model::{Policy, Rule};
    use sg_domain::RuleAction;

    fn state_with(policies: Vec<Policy>) -> AppState {
        let mut state = AppState::default_state();
        state.policies = policies;
        state
    }

    #[test]
    fn build_sorts_policies_by_priority() {
        let mut low = Policy::new("low", 200);
        low.rules.push(Rule::new("r1", "*", "true", RuleAction::Allow));
        let mut high = Policy::new("high", 50);
        high.rules.push(Rule::new("r2", "*", "true", RuleAction::Deny));

        let snapshot = RuleSet::build(&state_with(vec![low, high]));
        assert_eq!(snapshot.policies()[0].name, "high");
        assert_eq!(snapshot.policies()[1].name, "low");
    }

    #[test]
    fn priority_ties_resolve_by_created_at() {
        let mut older = Policy::new("older", 100);
        older.created_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let newer = Policy::new("newer", 100);

        let snapshot = RuleSet::build(&state_with(vec![newer, older]));
        assert_eq!(snapshot.policies()[0].name, "older");
    }

    #[test]
    fn bad_condition_demotes_rule_and_keeps_the_rest() {
        let mut policy = Policy::new("p", 100);
        policy
            .rules
            .push(Rule::new("broken", "*", "this is ((( not cel", RuleAction::Deny));
        policy.rules.push(Rule::new("fine", "*", "true", RuleAction::Allow));

        let snapshot = RuleSet::build(&state_with(vec![policy]));
        assert_eq!(snapshot.diagnostics().len(), 1);
        assert_eq!(snapshot.diagnostics()[0].rule_name, "broken");

        let rules = &snapshot.policies()[0].rules;
        let broken = rules.iter().find(|r| r.name == "broken").unwrap();
        assert!(!broken.enabled);
        let fine = rules.iter().find(|r| r.name == "fine").unwrap();
        assert!(fine.enabled);
        assert!(snapshot.compiled(&fine.condition).is_some());
    }

    #[test]
    fn identical_conditions_share_one_cache_entry() {
        let mut policy = Policy::new("p", 100);
        policy.rules.push(Rule::new("a", "*", "true", RuleAction::Allow));
        policy.rules.push(Rule::new("b", "*", "true", RuleAction::Deny));

        let snapshot = RuleSet::build(&state_with(vec![policy]));
        assert_eq!(snapshot.cache.len(), 1);
    }

    #[test]
    fn publish_swaps_while_old_snapshot_stays_valid() {
        let shared = SharedRuleSet::new(RuleSet::empty(DefaultPolicy::Allow));
        let old = shared.snapshot();

        shared.publish(RuleSet::empty(DefaultPolicy::Deny));
        // The old reference is still readable after the swap.
        assert_eq!(old.default_policy(), DefaultPolicy::Allow);
        assert_eq!(shared.snapshot().default_policy(), DefaultPolicy::Deny);
    }

    #[test]
    fn validate_rule_rejects_bad_condition() {
        let rule = Rule::new("r", "*", "unknown_var == 1", RuleAction::Allow);
        assert!(validate_rule(&rule).is_err());
    }
}
