//! API key management.
//!
//! Creation is the only moment the plaintext key exists outside the
//! caller's hands; every other read returns metadata only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use sg_domain::model::{ApiKey, ApiKeyView};
use sg_domain::Error;

use crate::runtime::keys;
use crate::state::GatewayState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub identity_id: String,
    pub name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn list_keys(State(state): State<GatewayState>) -> impl IntoResponse {
    let views: Vec<ApiKeyView> = state
        .state
        .doc
        .read()
        .api_keys
        .iter()
        .map(ApiKeyView::from)
        .collect();
    Json(serde_json::json!({
        "count": views.len(),
        "api_keys": views,
    }))
}

pub async fn create_key(
    State(state): State<GatewayState>,
    Json(req): Json<CreateKeyRequest>,
) -> Response {
    let (plaintext, key_hash) = match keys::generate_key() {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let key = ApiKey {
        id: Uuid::new_v4().to_string(),
        identity_id: req.identity_id,
        name: req.name,
        key_hash,
        created_at: Utc::now(),
        expires_at: req.expires_at,
        revoked: false,
    };

    let result = state
        .mutate({
            let key = key.clone();
            move |doc| {
                if doc.identity(&key.identity_id).is_none() {
                    return Err(Error::Validation(format!(
                        "identity {} does not exist",
                        key.identity_id
                    )));
                }
                doc.api_keys.push(key);
                Ok(())
            }
        })
        .await;

    match result {
        Ok(()) => {
            // The single emission of the plaintext.
            let mut body = serde_json::to_value(ApiKeyView::from(&key)).unwrap_or_default();
            body["api_key"] = serde_json::Value::String(plaintext);
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn revoke_key(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let key = doc
                .api_keys
                .iter_mut()
                .find(|k| k.id == id)
                .ok_or_else(|| Error::NotFound(format!("api key {id} not found")))?;
            key.revoked = true;
            Ok(())
        })
        .await;

    match result {
        Ok(()) => Json(serde_json::json!({ "revoked": true })).into_response(),
        Err(e) => error_response(&e),
    }
}
