//! Gateway status + auth probe.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::GatewayState;

pub async fn gateway_status(State(state): State<GatewayState>) -> impl IntoResponse {
    let snapshot = state.rules.snapshot();
    let (policies, outbound_rules, identities, api_keys) = {
        let doc = state.state.doc.read();
        (
            doc.policies.len(),
            doc.outbound_rules.len(),
            doc.identities.len(),
            doc.api_keys.len(),
        )
    };

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "default_policy": snapshot.default_policy(),
        "policies": policies,
        "outbound_rules": outbound_rules,
        "identities": identities,
        "api_keys": api_keys,
        "pending_approvals": state.approvals.list_pending().len(),
        "audit_records": state.audit.len(),
        "disabled_rules": snapshot.diagnostics(),
    }))
}

/// CSRF-exempt probe used by the UI to learn whether it is talking to a
/// live loopback gateway (a fresh CSRF cookie rides on the response).
pub async fn auth_status() -> impl IntoResponse {
    Json(serde_json::json!({
        "authenticated": true,
        "mode": "loopback",
    }))
}
