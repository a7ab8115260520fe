//! Shared fixtures for gateway integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use tower::ServiceExt;

use sg_domain::config::Config;
use sg_gateway::api;
use sg_gateway::bootstrap::build_gateway_state;
use sg_gateway::state::GatewayState;

pub const CSRF_TOKEN: &str = "49276d206120746573742d6f6e6c7920637372662d746f6b656e2076616c7565";

/// A gateway over a fresh temp store. Defaults are not seeded so tests
/// start from a truly empty rule set unless they opt in.
pub async fn test_gateway(seed_defaults: bool) -> (tempfile::TempDir, GatewayState) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.store.state_path = dir.path().join("state.json");
    config.policy.seed_defaults = seed_defaults;
    let state = build_gateway_state(Arc::new(config)).await.unwrap();
    (dir, state)
}

pub fn app(state: &GatewayState) -> Router {
    api::router().with_state(state.clone())
}

/// Build a request that looks like it came from loopback, with the CSRF
/// double-submit pair already attached for state-changing methods.
pub fn local_request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    request_from(method, uri, body, "127.0.0.1:54321")
}

pub fn request_from(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    peer: &str,
) -> Request<Body> {
    let needs_csrf = !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
    let mut builder = Request::builder().method(method).uri(uri);
    if needs_csrf {
        builder = builder
            .header(header::COOKIE, format!("sentinel_csrf_token={CSRF_TOKEN}"))
            .header("x-csrf-token", CSRF_TOKEN);
    }
    let mut request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// POST a JSON body and expect a given status, returning the JSON reply.
pub async fn post_expect(
    router: &Router,
    uri: &str,
    body: serde_json::Value,
    expected: StatusCode,
) -> serde_json::Value {
    let response = send(router, local_request(Method::POST, uri, Some(body))).await;
    assert_eq!(response.status(), expected, "POST {uri}");
    body_json(response).await
}
