//! Egress control — walks outbound rules against a destination.

use sg_domain::model::{OutboundAction, OutboundMode, OutboundRule, OutboundTarget, TargetType};

use crate::net::{domain_matches, ip_in_cidr, port_in_range};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verdict
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A non-blocking observation from an `alert` or `log` rule.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EgressFinding {
    pub rule_id: String,
    pub rule_name: String,
    pub action: OutboundAction,
    pub matched_target: String,
}

/// Outcome of the outbound walk.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum EgressVerdict {
    Allowed { findings: Vec<EgressFinding> },
    Blocked {
        rule_id: String,
        rule_name: String,
        reason: String,
        findings: Vec<EgressFinding>,
    },
}

impl EgressVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// The destination fields the walk can match on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Destination<'a> {
    pub domain: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub port: Option<u16>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Walk
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Walk enabled rules in the order the snapshot sorted them (priority
/// ascending). A matching blocklist rule applies its action — `block`
/// terminates, `alert`/`log` record a finding and continue. An allowlist
/// rule the destination does NOT match terminates with a block.
pub fn evaluate_outbound(rules: &[OutboundRule], dest: Destination<'_>) -> EgressVerdict {
    let mut findings = Vec::new();

    for rule in rules {
        if !rule.enabled {
            continue;
        }
        let matched = rule.targets.iter().find(|t| target_matches(t, dest));
        match rule.mode {
            OutboundMode::Blocklist => {
                let Some(target) = matched else { continue };
                match rule.action {
                    OutboundAction::Block => {
                        return EgressVerdict::Blocked {
                            rule_id: rule.id.clone(),
                            rule_name: rule.name.clone(),
                            reason: format!(
                                "destination matched blocklist '{}' ({})",
                                rule.name, target.value
                            ),
                            findings,
                        };
                    }
                    OutboundAction::Alert | OutboundAction::Log => {
                        findings.push(EgressFinding {
                            rule_id: rule.id.clone(),
                            rule_name: rule.name.clone(),
                            action: rule.action,
                            matched_target: target.value.clone(),
                        });
                    }
                }
            }
            OutboundMode::Allowlist => {
                if matched.is_none() {
                    return EgressVerdict::Blocked {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        reason: format!("destination not in allowlist '{}'", rule.name),
                        findings,
                    };
                }
            }
        }
    }

    EgressVerdict::Allowed { findings }
}

fn target_matches(target: &OutboundTarget, dest: Destination<'_>) -> bool {
    match target.target_type {
        TargetType::Domain => dest
            .domain
            .map_or(false, |d| d.eq_ignore_ascii_case(&target.value)),
        TargetType::DomainGlob => dest
            .domain
            .map_or(false, |d| domain_matches(d, &target.value)),
        TargetType::Ip => dest.ip.map_or(false, |ip| ip == target.value),
        TargetType::Cidr => dest.ip.map_or(false, |ip| ip_in_cidr(ip, &target.value)),
        TargetType::PortRange => dest
            .port
            .map_or(false, |port| port_in_range(port, &target.value)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
