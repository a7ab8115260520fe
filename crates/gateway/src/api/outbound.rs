//! Outbound (egress) rule CRUD + destination dry-run.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use sg_domain::model::{OutboundAction, OutboundMode, OutboundRule, OutboundTarget};
use sg_domain::Error;
use sg_policy::{evaluate_outbound, Destination};

use crate::state::GatewayState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct CreateOutboundRequest {
    pub name: String,
    pub mode: OutboundMode,
    pub targets: Vec<OutboundTarget>,
    pub action: OutboundAction,
    #[serde(default = "d_priority")]
    pub priority: i32,
    #[serde(default = "d_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOutboundRequest {
    pub name: Option<String>,
    pub mode: Option<OutboundMode>,
    pub targets: Option<Vec<OutboundTarget>>,
    pub action: Option<OutboundAction>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TestDestinationRequest {
    #[serde(default)]
    pub dest_domain: Option<String>,
    #[serde(default)]
    pub dest_ip: Option<String>,
    #[serde(default)]
    pub dest_port: Option<u16>,
}

fn d_priority() -> i32 {
    100
}
fn d_true() -> bool {
    true
}

pub async fn list_rules(State(state): State<GatewayState>) -> impl IntoResponse {
    let rules = state.state.doc.read().outbound_rules.clone();
    Json(serde_json::json!({
        "count": rules.len(),
        "outbound_rules": rules,
    }))
}

pub async fn create_rule(
    State(state): State<GatewayState>,
    Json(req): Json<CreateOutboundRequest>,
) -> Response {
    let rule = OutboundRule {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        mode: req.mode,
        targets: req.targets,
        action: req.action,
        priority: req.priority,
        enabled: req.enabled,
        read_only: false,
        created_at: Utc::now(),
    };
    if let Err(e) = rule.validate() {
        return error_response(&e);
    }

    let result = state
        .mutate({
            let rule = rule.clone();
            move |doc| {
                if doc.outbound_rules.iter().any(|r| r.name == rule.name) {
                    return Err(Error::Conflict(format!(
                        "outbound rule name '{}' already exists",
                        rule.name
                    )));
                }
                doc.outbound_rules.push(rule);
                Ok(())
            }
        })
        .await;

    match result {
        Ok(()) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn update_rule(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOutboundRequest>,
) -> Response {
    let structural = req.name.is_some()
        || req.mode.is_some()
        || req.targets.is_some()
        || req.action.is_some()
        || req.priority.is_some();

    let result = state
        .mutate(move |doc| {
            let rule = doc
                .outbound_rules
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::NotFound(format!("outbound rule {id} not found")))?;
            if rule.read_only && structural {
                return Err(Error::Forbidden(
                    "default outbound rules only allow toggling 'enabled'".into(),
                ));
            }
            if let Some(name) = req.name {
                rule.name = name;
            }
            if let Some(mode) = req.mode {
                rule.mode = mode;
            }
            if let Some(targets) = req.targets {
                rule.targets = targets;
            }
            if let Some(action) = req.action {
                rule.action = action;
            }
            if let Some(priority) = req.priority {
                rule.priority = priority;
            }
            if let Some(enabled) = req.enabled {
                rule.enabled = enabled;
            }
            rule.validate()?;
            Ok(rule.clone())
        })
        .await;

    match result {
        Ok(rule) => Json(rule).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_rule(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let rule = doc
                .outbound_rule(&id)
                .ok_or_else(|| Error::NotFound(format!("outbound rule {id} not found")))?;
            if rule.read_only {
                return Err(Error::Forbidden(
                    "default outbound rules cannot be deleted".into(),
                ));
            }
            doc.outbound_rules.retain(|r| r.id != id);
            Ok(())
        })
        .await;

    match result {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Dry-run a destination against the live outbound rules. CSRF-exempt:
/// runtime agents call this to pre-flight egress.
pub async fn test_destination(
    State(state): State<GatewayState>,
    Json(req): Json<TestDestinationRequest>,
) -> impl IntoResponse {
    let snapshot = state.rules.snapshot();
    let verdict = evaluate_outbound(
        snapshot.outbound(),
        Destination {
            domain: req.dest_domain.as_deref(),
            ip: req.dest_ip.as_deref(),
            port: req.dest_port,
        },
    );
    Json(serde_json::json!(verdict))
}
