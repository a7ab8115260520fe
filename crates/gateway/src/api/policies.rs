//! Policy CRUD + dry-run.
//!
//! - `GET    /v1/policies`       — list
//! - `POST   /v1/policies`       — create (validates rule conditions)
//! - `GET    /v1/policies/:id`   — fetch
//! - `PUT    /v1/policies/:id`   — update (read-only ⇒ `enabled` only)
//! - `DELETE /v1/policies/:id`   — delete
//! - `POST   /v1/policies/test`  — dry-run an action through the evaluator

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use sg_domain::model::{Policy, Rule};
use sg_domain::{CanonicalAction, Error, RuleAction, TimeoutAction};

use crate::state::GatewayState;

use super::{api_error, error_response};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RuleInput {
    pub name: String,
    #[serde(default = "d_priority")]
    pub priority: i32,
    pub tool_match: String,
    pub condition: String,
    pub action: RuleAction,
    #[serde(default)]
    pub approval_timeout_secs: Option<u64>,
    #[serde(default)]
    pub timeout_action: TimeoutAction,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default = "d_true")]
    pub enabled: bool,
}

fn d_priority() -> i32 {
    100
}
fn d_true() -> bool {
    true
}

impl RuleInput {
    fn into_rule(self) -> Rule {
        Rule {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            priority: self.priority,
            tool_match: self.tool_match,
            condition: self.condition,
            action: self.action,
            approval_timeout_secs: self.approval_timeout_secs,
            timeout_action: self.timeout_action,
            help_url: self.help_url,
            help_text: self.help_text,
            enabled: self.enabled,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "d_priority")]
    pub priority: i32,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<RuleInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub rules: Option<Vec<RuleInput>>,
}

impl UpdatePolicyRequest {
    /// Anything besides `enabled` counts as a structural change, which
    /// read-only policies reject.
    fn touches_more_than_enabled(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.priority.is_some()
            || self.rules.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_policies(State(state): State<GatewayState>) -> impl IntoResponse {
    let policies = state.state.doc.read().policies.clone();
    Json(serde_json::json!({
        "count": policies.len(),
        "policies": policies,
    }))
}

pub async fn get_policy(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.state.doc.read().policy(&id) {
        Some(policy) => Json(policy.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("policy {id} not found")),
    }
}

pub async fn create_policy(
    State(state): State<GatewayState>,
    Json(req): Json<CreatePolicyRequest>,
) -> Response {
    let now = Utc::now();
    let policy = Policy {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        priority: req.priority,
        enabled: req.enabled,
        rules: req.rules.into_iter().map(RuleInput::into_rule).collect(),
        created_at: now,
        updated_at: now,
        read_only: false,
    };

    if let Err(e) = sg_policy::validate_policy(&policy) {
        return error_response(&e);
    }

    let result = state
        .mutate({
            let policy = policy.clone();
            move |doc| {
                if doc.policies.iter().any(|p| p.name == policy.name) {
                    return Err(Error::Conflict(format!(
                        "policy name '{}' already exists",
                        policy.name
                    )));
                }
                doc.policies.push(policy);
                Ok(())
            }
        })
        .await;

    match result {
        Ok(()) => (StatusCode::CREATED, Json(policy)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn update_policy(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePolicyRequest>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let policy = doc
                .policy_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("policy {id} not found")))?;

            if policy.read_only && req.touches_more_than_enabled() {
                return Err(Error::Forbidden(
                    "default policies only allow toggling 'enabled'".into(),
                ));
            }

            if let Some(name) = req.name {
                policy.name = name;
            }
            if let Some(description) = req.description {
                policy.description = description;
            }
            if let Some(priority) = req.priority {
                policy.priority = priority;
            }
            if let Some(enabled) = req.enabled {
                policy.enabled = enabled;
            }
            if let Some(rules) = req.rules {
                policy.rules = rules.into_iter().map(RuleInput::into_rule).collect();
            }
            policy.updated_at = Utc::now();

            let updated = policy.clone();
            sg_policy::validate_policy(&updated)?;
            Ok(updated)
        })
        .await;

    match result {
        Ok(policy) => Json(policy).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_policy(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let policy = doc
                .policy(&id)
                .ok_or_else(|| Error::NotFound(format!("policy {id} not found")))?;
            if policy.read_only {
                return Err(Error::Forbidden("default policies cannot be deleted".into()));
            }
            doc.policies.retain(|p| p.id != id);
            Ok(())
        })
        .await;

    match result {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Dry-run: evaluate an action against the live snapshot without
/// touching the audit stream or creating approvals.
pub async fn test_policies(
    State(state): State<GatewayState>,
    Json(mut action): Json<CanonicalAction>,
) -> impl IntoResponse {
    action.normalize();
    let snapshot = state.rules.snapshot();
    let decision = sg_policy::evaluate(&snapshot, &action);
    Json(super::evaluate::decision_body(&action.request_id, &decision))
}
