//! Bundled default protections installed into a fresh state file.
//!
//! All of these are `read_only`: admins can toggle `enabled` but not
//! edit or delete them.

use chrono::Utc;
use uuid::Uuid;

use sg_domain::model::{
    AppState, OutboundAction, OutboundMode, OutboundRule, OutboundTarget, Policy, Rule,
    TargetType,
};
use sg_domain::{RuleAction, TimeoutAction};

/// Install the bundled policy and outbound defaults. Only meaningful on
/// a state that has none yet; seeding twice is prevented by name checks.
pub fn seed(state: &mut AppState) {
    if state.policies.iter().any(|p| p.name == DEFAULT_POLICY_NAME) {
        return;
    }

    let now = Utc::now();

    let mut policy = Policy {
        id: Uuid::new_v4().to_string(),
        name: DEFAULT_POLICY_NAME.to_owned(),
        description: "Bundled protections against credential exfiltration and destructive commands"
            .to_owned(),
        priority: 1000,
        enabled: true,
        rules: Vec::new(),
        created_at: now,
        updated_at: now,
        read_only: true,
    };

    policy.rules.push(Rule {
        id: Uuid::new_v4().to_string(),
        name: "block-private-key-material".to_owned(),
        priority: 10,
        tool_match: "*".to_owned(),
        condition: r#"action_arg_contains(arguments, "-----BEGIN ")"#.to_owned(),
        action: RuleAction::Deny,
        approval_timeout_secs: None,
        timeout_action: TimeoutAction::Deny,
        help_url: None,
        help_text: Some("Tool arguments contained private key material.".to_owned()),
        enabled: true,
        created_at: now,
    });

    policy.rules.push(Rule {
        id: Uuid::new_v4().to_string(),
        name: "approve-destructive-shell".to_owned(),
        priority: 20,
        tool_match: "*".to_owned(),
        condition: r#"dest_command.contains("rm -rf") || dest_command.contains("mkfs")"#.to_owned(),
        action: RuleAction::ApprovalRequired,
        approval_timeout_secs: Some(300),
        timeout_action: TimeoutAction::Deny,
        help_url: None,
        help_text: Some(
            "Destructive shell commands need human approval; ask your gateway admin.".to_owned(),
        ),
        enabled: true,
        created_at: now,
    });

    state.policies.push(policy);

    let mut blocklist = OutboundRule {
        id: Uuid::new_v4().to_string(),
        name: DEFAULT_OUTBOUND_NAME.to_owned(),
        mode: OutboundMode::Blocklist,
        targets: Vec::new(),
        action: OutboundAction::Block,
        priority: 1000,
        enabled: true,
        read_only: true,
        created_at: now,
    };
    for value in ["*.ngrok.io", "*.serveo.net", "*.localhost.run"] {
        blocklist.targets.push(OutboundTarget {
            target_type: TargetType::DomainGlob,
            value: value.to_owned(),
        });
    }
    state.outbound_rules.push(blocklist);
}

const DEFAULT_POLICY_NAME: &str = "default-protections";
const DEFAULT_OUTBOUND_NAME: &str = "default-tunnel-blocklist";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_installs_read_only_defaults() {
        let mut state = AppState::default_state();
        seed(&mut state);
        assert_eq!(state.policies.len(), 1);
        assert!(state.policies[0].read_only);
        assert_eq!(state.outbound_rules.len(), 1);
        assert!(state.outbound_rules[0].read_only);
    }

    #[test]
    fn seed_is_idempotent() {
        let mut state = AppState::default_state();
        seed(&mut state);
        seed(&mut state);
        assert_eq!(state.policies.len(), 1);
        assert_eq!(state.outbound_rules.len(), 1);
    }

    #[test]
    fn seeded_conditions_compile() {
        let mut state = AppState::default_state();
        seed(&mut state);
        let snapshot = sg_policy::RuleSet::build(&state);
        assert!(
            snapshot.diagnostics().is_empty(),
            "bundled rules must compile: {:?}",
            snapshot.diagnostics()
        );
    }
}
