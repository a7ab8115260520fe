//! HTTP-surface behavior: loopback anchoring, security headers, CSRF,
//! and the CRUD endpoints.

mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::*;

#[tokio::test]
async fn responses_carry_security_headers() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let response = send(&router, local_request(Method::GET, "/v1/status", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers
        .get("content-security-policy")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("frame-ancestors 'none'"));
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(
        headers.get("referrer-policy").unwrap(),
        "strict-origin-when-cross-origin"
    );
}

#[tokio::test]
async fn non_loopback_sources_are_rejected() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let response = send(
        &router,
        request_from(Method::GET, "/v1/status", None, "203.0.113.5:9999"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "admin API requires localhost access");
}

#[tokio::test]
async fn safe_requests_set_csrf_cookie() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let response = send(&router, local_request(Method::GET, "/v1/auth/status", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("sentinel_csrf_token="));
    assert!(cookie.contains("SameSite=Strict"));
}

#[tokio::test]
async fn state_changing_requests_without_csrf_are_rejected() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    // Bypass the helper so no CSRF pair is attached.
    let mut request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/identities")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(json!({"name": "x"}).to_string()))
        .unwrap();
    request.extensions_mut().insert(
        axum::extract::connect_info::ConnectInfo::<std::net::SocketAddr>(
            "127.0.0.1:5".parse().unwrap(),
        ),
    );
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "CSRF token invalid");
}

#[tokio::test]
async fn evaluate_endpoint_is_csrf_exempt() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let mut request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/policy/evaluate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({"action_name": "read_file"}).to_string(),
        ))
        .unwrap();
    request.extensions_mut().insert(
        axum::extract::connect_info::ConnectInfo::<std::net::SocketAddr>(
            "127.0.0.1:5".parse().unwrap(),
        ),
    );
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn policy_crud_round_trip() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let created = post_expect(
        &router,
        "/v1/policies",
        json!({
            "name": "readers",
            "priority": 100,
            "rules": [{
                "name": "allow-admins",
                "tool_match": "read_*",
                "condition": "\"admin\" in user_roles",
                "action": "allow"
            }]
        }),
        StatusCode::CREATED,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    let listed = body_json(send(&router, local_request(Method::GET, "/v1/policies", None)).await).await;
    assert_eq!(listed["count"], 1);

    let updated = send(
        &router,
        local_request(
            Method::PUT,
            &format!("/v1/policies/{id}"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(body_json(updated).await["enabled"], false);

    let deleted = send(
        &router,
        local_request(Method::DELETE, &format!("/v1/policies/{id}"), None),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::OK);

    let listed = body_json(send(&router, local_request(Method::GET, "/v1/policies", None)).await).await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn bad_condition_is_rejected_at_creation() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let body = post_expect(
        &router,
        "/v1/policies",
        json!({
            "name": "broken",
            "rules": [{
                "name": "bad",
                "tool_match": "*",
                "condition": "unknown_identifier == 1",
                "action": "deny"
            }]
        }),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert!(body["error"].as_str().unwrap().contains("unknown identifier"));
}

#[tokio::test]
async fn empty_tool_match_is_rejected() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    post_expect(
        &router,
        "/v1/policies",
        json!({
            "name": "broken",
            "rules": [{
                "name": "bad",
                "tool_match": "",
                "condition": "true",
                "action": "deny"
            }]
        }),
        StatusCode::BAD_REQUEST,
    )
    .await;
}

#[tokio::test]
async fn read_only_defaults_allow_only_enabled_toggle() {
    let (_dir, state) = test_gateway(true).await;
    let router = app(&state);

    let listed = body_json(send(&router, local_request(Method::GET, "/v1/policies", None)).await).await;
    let id = listed["policies"][0]["id"].as_str().unwrap().to_owned();
    assert_eq!(listed["policies"][0]["read_only"], true);

    // Toggling enabled is fine.
    let toggled = send(
        &router,
        local_request(
            Method::PUT,
            &format!("/v1/policies/{id}"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(toggled.status(), StatusCode::OK);

    // Structural edits are forbidden.
    let renamed = send(
        &router,
        local_request(
            Method::PUT,
            &format!("/v1/policies/{id}"),
            Some(json!({"name": "renamed"})),
        ),
    )
    .await;
    assert_eq!(renamed.status(), StatusCode::FORBIDDEN);

    // Deleting is forbidden.
    let deleted = send(
        &router,
        local_request(Method::DELETE, &format!("/v1/policies/{id}"), None),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn identity_name_conflict_is_409() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    post_expect(
        &router,
        "/v1/identities",
        json!({"name": "agent", "roles": ["user"]}),
        StatusCode::CREATED,
    )
    .await;
    post_expect(
        &router,
        "/v1/identities",
        json!({"name": "agent"}),
        StatusCode::CONFLICT,
    )
    .await;
}

#[tokio::test]
async fn api_key_plaintext_is_emitted_exactly_once() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let identity = post_expect(
        &router,
        "/v1/identities",
        json!({"name": "agent", "roles": ["user"]}),
        StatusCode::CREATED,
    )
    .await;
    let identity_id = identity["id"].as_str().unwrap();

    let created = post_expect(
        &router,
        "/v1/api-keys",
        json!({"identity_id": identity_id, "name": "ci"}),
        StatusCode::CREATED,
    )
    .await;
    let plaintext = created["api_key"].as_str().unwrap().to_owned();
    assert!(plaintext.starts_with("sg_"));
    assert_eq!(plaintext.len(), 67);

    // No later read surfaces the plaintext, and the persisted state
    // holds only the KDF digest.
    let listed = body_json(send(&router, local_request(Method::GET, "/v1/api-keys", None)).await).await;
    assert!(!listed.to_string().contains(&plaintext));
    {
        let doc = state.state.doc.read();
        let persisted = serde_json::to_string(&*doc).unwrap();
        assert!(!persisted.contains(&plaintext));
        assert!(doc.api_keys[0].key_hash.starts_with("$argon2"));
    }
}

#[tokio::test]
async fn unknown_policy_is_404() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);
    let response = send(&router, local_request(Method::GET, "/v1/policies/nope", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audit_export_is_csv() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    // Produce one decision so the export has a row.
    post_expect(
        &router,
        "/v1/policy/evaluate",
        json!({"action_name": "read_file"}),
        StatusCode::OK,
    )
    .await;

    let response = send(&router, local_request(Method::GET, "/v1/audit/export", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let csv = body_text(response).await;
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "timestamp,session_id,identity_id,tool_name,decision,reason,rule_id,request_id,latency_micros,protocol,framework"
    );
    assert_eq!(lines.count(), 1);
}

#[tokio::test]
async fn gateway_targets_are_replaced_wholesale() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let response = send(
        &router,
        local_request(
            Method::PUT,
            "/v1/config/gateway-targets",
            Some(json!([
                {"name": "anthropic", "upstream_url": "https://api.anthropic.com"},
                {"name": "openai", "upstream_url": "https://api.openai.com"}
            ])),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let listed = body_json(
        send(&router, local_request(Method::GET, "/v1/config/gateway-targets", None)).await,
    )
    .await;
    assert_eq!(listed["targets"].as_array().unwrap().len(), 2);

    // Duplicate names conflict and leave the previous list intact.
    let response = send(
        &router,
        local_request(
            Method::PUT,
            "/v1/config/gateway-targets",
            Some(json!([
                {"name": "dup", "upstream_url": "https://a"},
                {"name": "dup", "upstream_url": "https://b"}
            ])),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let listed = body_json(
        send(&router, local_request(Method::GET, "/v1/config/gateway-targets", None)).await,
    )
    .await;
    assert_eq!(listed["targets"][0]["name"], "anthropic");
}

#[tokio::test]
async fn tls_inspection_toggles_and_persists_bypass_list() {
    let (_dir, state) = test_gateway(false).await;
    let router = app(&state);

    let response = send(
        &router,
        local_request(
            Method::PUT,
            "/v1/config/tls",
            Some(json!({"enabled": true, "bypass_domains": ["*.bank.com"]})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let tls = body_json(send(&router, local_request(Method::GET, "/v1/config/tls", None)).await).await;
    assert_eq!(tls["tls_inspection"]["enabled"], true);
    assert_eq!(tls["tls_inspection"]["bypass_domains"][0], "*.bank.com");
}

#[tokio::test]
async fn broken_rule_on_disk_is_demoted_and_reported() {
    // A condition that no longer compiles can only arrive via the state
    // file (creation validates); the snapshot must demote it and the
    // status endpoint must surface the diagnostic.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut doc = sg_domain::model::AppState::default_state();
    let mut policy = sg_domain::model::Policy::new("on-disk", 10);
    policy.rules.push(sg_domain::model::Rule::new(
        "broken",
        "*",
        "((( not cel",
        sg_domain::RuleAction::Deny,
    ));
    doc.policies.push(policy);
    sg_store::StateStore::new(&path).save(&doc).unwrap();

    let mut config = sg_domain::config::Config::default();
    config.store.state_path = path;
    config.policy.seed_defaults = false;
    let state = sg_gateway::bootstrap::build_gateway_state(std::sync::Arc::new(config))
        .await
        .unwrap();
    let router = app(&state);

    let status = body_json(send(&router, local_request(Method::GET, "/v1/status", None)).await).await;
    assert_eq!(status["disabled_rules"][0]["rule_name"], "broken");

    // The broken rule never matches; the default policy still applies.
    let decision = post_expect(
        &router,
        "/v1/policy/evaluate",
        json!({"action_name": "anything"}),
        StatusCode::OK,
    )
    .await;
    assert_eq!(decision["allowed"], true);
}

#[tokio::test]
async fn mutations_survive_reload() {
    let (dir, state) = test_gateway(false).await;
    let router = app(&state);
    post_expect(
        &router,
        "/v1/identities",
        json!({"name": "agent", "roles": ["user"]}),
        StatusCode::CREATED,
    )
    .await;

    // A second gateway over the same path sees the mutation.
    let mut config = sg_domain::config::Config::default();
    config.store.state_path = dir.path().join("state.json");
    config.policy.seed_defaults = false;
    let reloaded = sg_gateway::bootstrap::build_gateway_state(std::sync::Arc::new(config))
        .await
        .unwrap();
    assert_eq!(reloaded.state.doc.read().identities.len(), 1);
}
