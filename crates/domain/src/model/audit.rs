//! Audit records — one per terminal decision, appended in decision order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::CanonicalAction;
use crate::decision::Decision;

/// Immutable record of one decided request. Also the row shape for the
/// CSV export and the payload of the audit SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(default)]
    pub session_id: String,
    pub identity_id: String,
    pub identity_name: String,
    pub tool_name: String,
    /// Terminal outcome: `allow`, `deny`, or `cancelled`.
    pub decision: String,
    pub allowed: bool,
    pub reason: String,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: String,
    pub latency_us: u64,
    pub protocol: String,
    #[serde(default)]
    pub framework: String,
}

impl AuditRecord {
    /// Build the record for a decided action.
    pub fn decided(action: &CanonicalAction, decision: &Decision) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: action.request_id.clone(),
            session_id: action.session_id.clone().unwrap_or_default(),
            identity_id: action.identity_id.clone(),
            identity_name: action.identity_name.clone(),
            tool_name: action.action_name.clone(),
            decision: if decision.allowed { "allow" } else { "deny" }.to_owned(),
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            rule_id: decision.rule_id.clone(),
            rule_name: decision.rule_name.clone(),
            latency_us: decision.latency_us,
            protocol: action.protocol.as_str().to_owned(),
            framework: action.framework.clone().unwrap_or_default(),
        }
    }

    /// Build the record for a request aborted by caller cancellation —
    /// not a policy decision, but still audited.
    pub fn cancelled(action: &CanonicalAction) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: action.request_id.clone(),
            session_id: action.session_id.clone().unwrap_or_default(),
            identity_id: action.identity_id.clone(),
            identity_name: action.identity_name.clone(),
            tool_name: action.action_name.clone(),
            decision: "cancelled".to_owned(),
            allowed: false,
            reason: "request cancelled before decision".to_owned(),
            rule_id: String::new(),
            rule_name: String::new(),
            latency_us: 0,
            protocol: action.protocol.as_str().to_owned(),
            framework: action.framework.clone().unwrap_or_default(),
        }
    }

    /// CSV header matching [`AuditRecord::csv_row`].
    pub fn csv_header() -> &'static str {
        "timestamp,session_id,identity_id,tool_name,decision,reason,rule_id,request_id,latency_micros,protocol,framework"
    }

    /// One CSV row. Only `reason` can contain commas or quotes; fields we
    /// generate ourselves (ids, enum strings) never need quoting.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp.to_rfc3339(),
            csv_field(&self.session_id),
            csv_field(&self.identity_id),
            csv_field(&self.tool_name),
            self.decision,
            csv_field(&self.reason),
            csv_field(&self.rule_id),
            csv_field(&self.request_id),
            self.latency_us,
            self.protocol,
            csv_field(&self.framework),
        )
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;

    #[test]
    fn csv_row_quotes_reason_with_comma() {
        let mut action = CanonicalAction::tool_call("read_file", serde_json::Map::new());
        action.identity_id = "id-1".into();
        let decision = Decision::deny("matched rule 'a, b'");
        let record = AuditRecord::decided(&action, &decision);
        let row = record.csv_row();
        assert!(row.contains("\"matched rule 'a, b'\""));
    }

    #[test]
    fn header_column_count_matches_row() {
        let action = CanonicalAction::tool_call("x", serde_json::Map::new());
        let record = AuditRecord::decided(&action, &Decision::allow("ok"));
        let columns = AuditRecord::csv_header().split(',').count();
        assert_eq!(record.csv_row().split(',').count(), columns);
    }

    #[test]
    fn cancelled_record_is_not_a_policy_decision() {
        let action = CanonicalAction::tool_call("x", serde_json::Map::new());
        let record = AuditRecord::cancelled(&action);
        assert_eq!(record.decision, "cancelled");
        assert!(!record.allowed);
    }
}
