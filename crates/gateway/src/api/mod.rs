//! The admin + SDK HTTP surface.
//!
//! JSON over HTTP, loopback only. Every response carries the security
//! headers; state-changing endpoints are CSRF-protected except the two
//! agent-called ones (`/v1/policy/evaluate`, `/v1/outbound/test`).

pub mod api_keys;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod csrf;
pub mod evaluate;
pub mod guard;
pub mod headers;
pub mod identities;
pub mod outbound;
pub mod policies;
pub mod status;
pub mod tools;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;

use sg_domain::Error;

use crate::state::GatewayState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a domain error onto its HTTP status.
pub(crate) fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::Validation(_) | Error::Compile(_) | Error::Eval(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        Error::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Error::Persistence(_) | Error::Io(_) | Error::Json(_) | Error::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

/// Build the full API router.
pub fn router() -> Router<GatewayState> {
    Router::new()
        // Status & auth probe
        .route("/v1/status", get(status::gateway_status))
        .route("/v1/auth/status", get(status::auth_status))
        // Policies
        .route("/v1/policies", get(policies::list_policies))
        .route("/v1/policies", post(policies::create_policy))
        .route("/v1/policies/test", post(policies::test_policies))
        .route("/v1/policies/:id", get(policies::get_policy))
        .route("/v1/policies/:id", put(policies::update_policy))
        .route("/v1/policies/:id", delete(policies::delete_policy))
        // Identities
        .route("/v1/identities", get(identities::list_identities))
        .route("/v1/identities", post(identities::create_identity))
        .route("/v1/identities/:id", get(identities::get_identity))
        .route("/v1/identities/:id", put(identities::update_identity))
        .route("/v1/identities/:id", delete(identities::delete_identity))
        // API keys
        .route("/v1/api-keys", get(api_keys::list_keys))
        .route("/v1/api-keys", post(api_keys::create_key))
        .route("/v1/api-keys/:id", delete(api_keys::revoke_key))
        // Outbound rules
        .route("/v1/outbound", get(outbound::list_rules))
        .route("/v1/outbound", post(outbound::create_rule))
        .route("/v1/outbound/test", post(outbound::test_destination))
        .route("/v1/outbound/:id", put(outbound::update_rule))
        .route("/v1/outbound/:id", delete(outbound::delete_rule))
        // Approvals
        .route("/v1/approvals", get(approvals::list_pending))
        .route("/v1/approvals/:id/approve", post(approvals::approve))
        .route("/v1/approvals/:id/deny", post(approvals::deny))
        // Audit
        .route("/v1/audit", get(audit::recent))
        .route("/v1/audit/stream", get(audit::stream))
        .route("/v1/audit/export", get(audit::export_csv))
        // SDK evaluate
        .route("/v1/policy/evaluate", post(evaluate::evaluate))
        .route(
            "/v1/policy/evaluate/:request_id/status",
            get(evaluate::evaluation_status),
        )
        // Tool baselines & quarantine
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/tools/observe", post(tools::observe))
        .route("/v1/tools/:name/quarantine", post(tools::quarantine))
        .route("/v1/tools/:name/unquarantine", post(tools::unquarantine))
        // Live config
        .route("/v1/config/scanning", put(config::update_scanning))
        .route("/v1/config/default-policy", put(config::update_default_policy))
        .route("/v1/config/gateway-targets", get(config::list_gateway_targets))
        .route("/v1/config/gateway-targets", put(config::update_gateway_targets))
        .route("/v1/config/tls", get(config::get_tls_inspection))
        .route("/v1/config/tls", put(config::update_tls_inspection))
        // Cross-cutting layers. Axum runs the last-added layer first:
        // loopback check, then CSRF, headers stamped on the way out.
        .layer(middleware::from_fn(csrf::csrf_protect))
        .layer(middleware::from_fn(guard::require_loopback))
        .layer(middleware::from_fn(headers::security_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
