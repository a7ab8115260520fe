//! Tool baseline & quarantine endpoints.
//!
//! `observe` is the adapter-facing hook: MCP transports report every
//! advertised tool here so first sightings are baselined and drift is
//! quarantined.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use sg_domain::Error;

use crate::chain::tool_security::{observe_tool, ToolObservation};
use crate::state::GatewayState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ObserveRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "d_empty_schema")]
    pub input_schema: Value,
}

fn d_empty_schema() -> Value {
    serde_json::json!({})
}

pub async fn list_tools(State(state): State<GatewayState>) -> impl IntoResponse {
    let doc = state.state.doc.read();
    Json(serde_json::json!({
        "baselines": doc.tool_baselines,
        "quarantined": doc.quarantined_tools,
    }))
}

pub async fn observe(
    State(state): State<GatewayState>,
    Json(req): Json<ObserveRequest>,
) -> Response {
    match observe_tool(&state.state, &req.name, &req.description, &req.input_schema).await {
        Ok(observation) => {
            if observation == ToolObservation::Drifted {
                // Quarantine set feeds the tool-security stage.
                state.republish();
            }
            Json(serde_json::json!({
                "tool": req.name,
                "observation": observation,
            }))
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn quarantine(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            doc.quarantined_tools.insert(name.clone());
            Ok(name)
        })
        .await;
    match result {
        Ok(name) => Json(serde_json::json!({ "tool": name, "quarantined": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn unquarantine(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    let result = state
        .mutate(move |doc| {
            if !doc.quarantined_tools.remove(&name) {
                return Err(Error::NotFound(format!("tool '{name}' is not quarantined")));
            }
            // Releasing a drifted tool means accepting the new shape;
            // drop the stale baseline so the next sighting recaptures.
            doc.tool_baselines.remove(&name);
            Ok(name)
        })
        .await;
    match result {
        Ok(name) => {
            Json(serde_json::json!({ "tool": name, "quarantined": false })).into_response()
        }
        Err(e) => error_response(&e),
    }
}
