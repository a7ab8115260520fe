//! The SDK evaluate surface.
//!
//! - `POST /v1/policy/evaluate` — run an action through the full chain.
//!   Blocks on approval by default; `wait_for_approval: false` submits
//!   and returns the pending decision for polling.
//! - `GET /v1/policy/evaluate/:request_id/status` — poll a decision.
//!
//! A presented `Authorization: Bearer sg_…` key resolves the caller's
//! identity before the chain runs; otherwise the identity fields in the
//! body are used as presented.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use sg_domain::{CanonicalAction, Decision};

use crate::chain::ChainContext;
use crate::runtime::keys;
use crate::state::GatewayState;

use super::{api_error, error_response};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(flatten)]
    pub action: CanonicalAction,
    /// `false` = submit-and-poll.
    #[serde(default = "d_true")]
    pub wait_for_approval: bool,
}

fn d_true() -> bool {
    true
}

/// The decision body shared by evaluate, dry-run, and status responses.
pub fn decision_body(request_id: &str, decision: &Decision) -> serde_json::Value {
    let mut body = serde_json::json!({
        "allowed": decision.allowed,
        "decision": decision.action.as_str(),
        "rule_id": decision.rule_id,
        "rule_name": decision.rule_name,
        "reason": decision.reason,
        "request_id": request_id,
        "latency_ms": decision.latency_us as f64 / 1000.0,
    });
    if let Some(help_url) = &decision.help_url {
        body["help_url"] = serde_json::json!(help_url);
    }
    if let Some(help_text) = &decision.help_text {
        body["help_text"] = serde_json::json!(help_text);
    }
    if let Some(approval_id) = &decision.approval_id {
        body["approval_id"] = serde_json::json!(approval_id);
    }
    if !decision.terminal {
        body["status"] = serde_json::json!("pending");
        if let Some(deadline) = &decision.approval_deadline {
            body["approval_deadline"] = serde_json::json!(deadline);
        }
    }
    body
}

pub async fn evaluate(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<EvaluateRequest>,
) -> Response {
    let mut action = req.action;
    action.normalize();

    // Bearer key → identity, checked before anything else sees the
    // presented identity fields.
    if let Some(token) = bearer_token(&headers) {
        let resolved = {
            let doc = state.state.doc.read();
            keys::resolve_identity(&doc, &token)
        };
        match resolved {
            Some(identity) => {
                action.identity_id = identity.id;
                action.identity_name = identity.name;
                action.identity_roles = identity.roles;
            }
            None => return api_error(StatusCode::UNAUTHORIZED, "invalid or revoked API key"),
        }
    }

    let cx = ChainContext {
        client_ip: Some(peer.ip()),
        cancel: tokio_util::sync::CancellationToken::new(),
        wait_for_approval: req.wait_for_approval,
    };

    match state.chain.run(action.clone(), &cx).await {
        Ok(decision) => {
            let status = if decision.terminal {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            (status, Json(decision_body(&action.request_id, &decision))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn evaluation_status(
    State(state): State<GatewayState>,
    Path(request_id): Path<String>,
) -> Response {
    // A live pending approval takes precedence over history.
    if let Some(approval) = state.approvals.find_by_request(&request_id) {
        if !approval.status.is_terminal() {
            return Json(serde_json::json!({
                "request_id": request_id,
                "status": "pending",
                "approval_id": approval.id,
                "deadline": approval.deadline,
            }))
            .into_response();
        }
    }

    match state.audit.find(&request_id) {
        Some(record) => Json(serde_json::json!({
            "request_id": request_id,
            "status": "decided",
            "record": record,
        }))
        .into_response(),
        None => api_error(
            StatusCode::NOT_FOUND,
            format!("no evaluation recorded for request {request_id}"),
        ),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
