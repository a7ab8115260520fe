//! Tool security stage — quarantine enforcement and baseline drift.
//!
//! The stage itself denies calls to quarantined tools. Baseline capture
//! and drift detection run at tool-discovery time (when an MCP adapter
//! relays a `tools/list`): the first sighting records a baseline, a
//! changed description or schema quarantines the tool until an admin
//! releases it.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use sg_domain::model::ToolBaseline;
use sg_domain::{CanonicalAction, Decision, Protocol, Result};

use crate::state::StateHandle;

use super::{ChainContext, Interceptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolSecurity {
    quarantined: Arc<BTreeSet<String>>,
}

impl ToolSecurity {
    pub fn new(quarantined: Arc<BTreeSet<String>>) -> Self {
        Self { quarantined }
    }
}

#[async_trait]
impl Interceptor for ToolSecurity {
    fn name(&self) -> &'static str {
        "tool_security"
    }

    async fn intercept(
        &self,
        action: &mut CanonicalAction,
        _cx: &ChainContext,
    ) -> Result<Option<Decision>> {
        if action.protocol == Protocol::Mcp && self.quarantined.contains(&action.action_name) {
            return Ok(Some(Decision::deny(format!(
                "tool '{}' is quarantined pending baseline review",
                action.action_name
            ))));
        }
        Ok(None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Baseline capture & drift
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of observing a tool advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolObservation {
    BaselineCaptured,
    Unchanged,
    /// Schema or description changed after capture; tool is now
    /// quarantined.
    Drifted,
}

/// Record a tool sighting: capture a baseline on first sight, detect
/// drift afterwards. Drift quarantines the tool and persists both the
/// quarantine and the (unchanged) original baseline.
pub async fn observe_tool(
    state: &StateHandle,
    name: &str,
    description: &str,
    input_schema: &Value,
) -> Result<ToolObservation> {
    let name = name.to_owned();
    let description = description.to_owned();
    let input_schema = input_schema.clone();

    state
        .mutate(move |doc| {
            match doc.tool_baselines.get(&name) {
                None => {
                    doc.tool_baselines.insert(
                        name.clone(),
                        ToolBaseline::new(description.clone(), input_schema.clone()),
                    );
                    tracing::info!(tool = %name, "tool baseline captured");
                    Ok(ToolObservation::BaselineCaptured)
                }
                Some(baseline) if baseline.drifted(&description, &input_schema) => {
                    doc.quarantined_tools.insert(name.clone());
                    tracing::warn!(
                        tool = %name,
                        baseline_fingerprint = %schema_fingerprint(&baseline.input_schema),
                        observed_fingerprint = %schema_fingerprint(&input_schema),
                        "tool schema drifted from baseline; quarantined"
                    );
                    Ok(ToolObservation::Drifted)
                }
                Some(_) => Ok(ToolObservation::Unchanged),
            }
        })
        .await
}

/// Stable SHA-256 fingerprint of a schema, insensitive to object key
/// order.
pub fn schema_fingerprint(schema: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(schema));
    hex::encode(&hasher.finalize()[..8])
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
