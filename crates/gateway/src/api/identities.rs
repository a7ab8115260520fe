//! Identity CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use sg_domain::model::Identity;
use sg_domain::Error;

use crate::state::GatewayState;

use super::{api_error, error_response};

#[derive(Debug, Deserialize)]
pub struct CreateIdentityRequest {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIdentityRequest {
    pub name: Option<String>,
    pub roles: Option<Vec<String>>,
}

pub async fn list_identities(State(state): State<GatewayState>) -> impl IntoResponse {
    let identities = state.state.doc.read().identities.clone();
    Json(serde_json::json!({
        "count": identities.len(),
        "identities": identities,
    }))
}

pub async fn get_identity(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.state.doc.read().identity(&id) {
        Some(identity) => Json(identity.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("identity {id} not found")),
    }
}

pub async fn create_identity(
    State(state): State<GatewayState>,
    Json(req): Json<CreateIdentityRequest>,
) -> Response {
    let identity = Identity::new(req.name, req.roles);
    let result = state
        .mutate({
            let identity = identity.clone();
            move |doc| doc.add_identity(identity)
        })
        .await;

    match result {
        Ok(()) => (StatusCode::CREATED, Json(identity)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn update_identity(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateIdentityRequest>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            // Uniqueness check against everyone else before borrowing
            // the target mutably.
            if let Some(name) = &req.name {
                if doc.identities.iter().any(|i| i.name == *name && i.id != id) {
                    return Err(Error::Conflict(format!(
                        "identity name '{name}' already exists"
                    )));
                }
            }
            let identity = doc
                .identities
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| Error::NotFound(format!("identity {id} not found")))?;
            if identity.read_only {
                return Err(Error::Forbidden("default identities cannot be modified".into()));
            }
            if let Some(name) = req.name {
                identity.name = name;
            }
            if let Some(roles) = req.roles {
                identity.roles = roles;
            }
            identity.validate()?;
            Ok(identity.clone())
        })
        .await;

    match result {
        Ok(identity) => Json(identity).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_identity(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let identity = doc
                .identity(&id)
                .ok_or_else(|| Error::NotFound(format!("identity {id} not found")))?;
            if identity.read_only {
                return Err(Error::Forbidden("default identities cannot be deleted".into()));
            }
            doc.identities.retain(|i| i.id != id);
            // Orphaned keys are useless; revoke them in the same commit.
            for key in doc.api_keys.iter_mut().filter(|k| k.identity_id == id) {
                key.revoked = true;
            }
            Ok(())
        })
        .await;

    match result {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(e) => error_response(&e),
    }
}
