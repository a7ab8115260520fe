//! Live configuration endpoints.
//!
//! These write through to the persisted state and republish the derived
//! snapshots, so the change applies to requests that start after the
//! call returns — in-flight requests finish under the old config.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use sg_domain::model::HttpGatewayTarget;
use sg_domain::{DefaultPolicy, Error};

use crate::state::GatewayState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ScanningRequest {
    pub enabled: Option<bool>,
    pub enforce: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DefaultPolicyRequest {
    pub default_policy: DefaultPolicy,
}

#[derive(Debug, Deserialize)]
pub struct GatewayTargetInput {
    pub name: String,
    pub upstream_url: String,
}

#[derive(Debug, Deserialize)]
pub struct TlsInspectionRequest {
    pub enabled: Option<bool>,
    pub bypass_domains: Option<Vec<String>>,
}

pub async fn update_scanning(
    State(state): State<GatewayState>,
    Json(req): Json<ScanningRequest>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            if let Some(enabled) = req.enabled {
                doc.content_scanning.enabled = enabled;
            }
            if let Some(enforce) = req.enforce {
                doc.content_scanning.enforce = enforce;
            }
            Ok(doc.content_scanning.clone())
        })
        .await;

    match result {
        Ok(scanning) => {
            tracing::info!(
                enabled = scanning.enabled,
                enforce = scanning.enforce,
                "content scanning reconfigured"
            );
            Json(serde_json::json!({ "content_scanning": scanning })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn list_gateway_targets(State(state): State<GatewayState>) -> impl IntoResponse {
    let targets = state.state.doc.read().http_gateway_targets.clone();
    Json(serde_json::json!({ "targets": targets }))
}

/// Replace the reverse-proxy upstream list wholesale. The HTTP-flow
/// adapter reads the published list per request, so a swap never tears
/// an in-flight proxy call.
pub async fn update_gateway_targets(
    State(state): State<GatewayState>,
    Json(targets): Json<Vec<GatewayTargetInput>>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            let mut replacement = Vec::with_capacity(targets.len());
            let mut seen = std::collections::HashSet::new();
            for target in targets {
                if target.name.trim().is_empty() || target.upstream_url.trim().is_empty() {
                    return Err(Error::Validation(
                        "gateway targets need a name and an upstream_url".into(),
                    ));
                }
                if !seen.insert(target.name.clone()) {
                    return Err(Error::Conflict(format!(
                        "duplicate gateway target '{}'",
                        target.name
                    )));
                }
                replacement.push(HttpGatewayTarget {
                    name: target.name,
                    upstream_url: target.upstream_url,
                });
            }
            doc.http_gateway_targets = replacement;
            Ok(doc.http_gateway_targets.clone())
        })
        .await;

    match result {
        Ok(targets) => {
            tracing::info!(count = targets.len(), "http gateway targets replaced");
            Json(serde_json::json!({ "targets": targets })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn get_tls_inspection(State(state): State<GatewayState>) -> impl IntoResponse {
    let tls = state.state.doc.read().tls_inspection.clone();
    Json(serde_json::json!({ "tls_inspection": tls }))
}

/// Toggle TLS inspection and replace the MITM bypass list. Consumed by
/// the (out-of-core) certificate forge via the published document.
pub async fn update_tls_inspection(
    State(state): State<GatewayState>,
    Json(req): Json<TlsInspectionRequest>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            if let Some(enabled) = req.enabled {
                doc.tls_inspection.enabled = enabled;
            }
            if let Some(bypass) = req.bypass_domains {
                doc.tls_inspection.bypass_domains = bypass;
            }
            Ok(doc.tls_inspection.clone())
        })
        .await;

    match result {
        Ok(tls) => {
            tracing::info!(
                enabled = tls.enabled,
                bypass = tls.bypass_domains.len(),
                "tls inspection reconfigured"
            );
            Json(serde_json::json!({ "tls_inspection": tls })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn update_default_policy(
    State(state): State<GatewayState>,
    Json(req): Json<DefaultPolicyRequest>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            doc.default_policy = req.default_policy;
            Ok(req.default_policy)
        })
        .await;

    match result {
        Ok(default_policy) => {
            tracing::info!(?default_policy, "default policy changed");
            Json(serde_json::json!({ "default_policy": default_policy })).into_response()
        }
        Err(e) => error_response(&e),
    }
}
