//! Approval admin endpoints — list pending, approve, deny.
//!
//! Resolutions wake any blocked request (which then audits its own final
//! decision); for submit-and-poll entries the resolution is audited
//! here.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use sg_domain::model::PendingApproval;

use crate::runtime::approval::resolution_record;
use crate::state::GatewayState;

use super::error_response;

#[derive(Debug, Deserialize, Default)]
pub struct DenyRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn list_pending(State(state): State<GatewayState>) -> impl IntoResponse {
    let pending = state.approvals.list_pending();
    Json(serde_json::json!({
        "count": pending.len(),
        "approvals": pending,
    }))
}

pub async fn approve(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.approvals.approve(id) {
        Ok(approval) => {
            finalize(&state, &approval).await;
            Json(approval).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn deny(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DenyRequest>>,
) -> Response {
    let reason = body.and_then(|Json(b)| b.reason);
    match state.approvals.deny(id, reason) {
        Ok(approval) => {
            finalize(&state, &approval).await;
            Json(approval).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Mirror the resolved entry into the persisted state and, when no
/// request is blocked on it, append the terminal audit record.
async fn finalize(state: &GatewayState, approval: &PendingApproval) {
    if !state.approvals.caller_waits(approval.id) {
        state.audit.append(resolution_record(approval));
    }
    let mirror = approval.clone();
    let result = state
        .state
        .mutate(move |doc| {
            doc.mirror_approval(mirror);
            Ok(())
        })
        .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, approval_id = %approval.id, "failed to mirror approval resolution");
    }
}
