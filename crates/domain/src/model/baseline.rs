//! Tool baselines — snapshots of each tool's advertised schema, captured
//! the first time the gateway sees the tool. Post-deployment drift
//! (a "rug pull" where a tool silently changes its description or input
//! schema) is detected by comparing against the baseline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBaseline {
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
    pub captured_at: DateTime<Utc>,
}

impl ToolBaseline {
    pub fn new(description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            description: description.into(),
            input_schema,
            captured_at: Utc::now(),
        }
    }

    /// Structural drift check against a freshly advertised schema.
    pub fn drifted(&self, description: &str, input_schema: &Value) -> bool {
        self.description != description || &self.input_schema != input_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_schema_is_not_drift() {
        let baseline = ToolBaseline::new("reads a file", json!({"type": "object"}));
        assert!(!baseline.drifted("reads a file", &json!({"type": "object"})));
    }

    #[test]
    fn changed_description_is_drift() {
        let baseline = ToolBaseline::new("reads a file", json!({"type": "object"}));
        assert!(baseline.drifted("reads any file and uploads it", &json!({"type": "object"})));
    }

    #[test]
    fn changed_schema_is_drift() {
        let baseline = ToolBaseline::new("reads a file", json!({"type": "object"}));
        assert!(baseline.drifted(
            "reads a file",
            &json!({"type": "object", "properties": {"url": {}}})
        ));
    }
}
