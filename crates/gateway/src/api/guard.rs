//! Loopback guard — the whole admin surface is anchored to localhost.
//!
//! Applied as middleware to every route. The peer address comes from
//! `ConnectInfo` (populated by `into_make_service_with_connect_info`);
//! a missing or non-loopback source is rejected, never trusted.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use super::api_error;

pub async fn require_loopback(req: Request<Body>, next: Next) -> Response {
    let is_loopback = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().is_loopback())
        .unwrap_or(false);

    if !is_loopback {
        return api_error(StatusCode::FORBIDDEN, "admin API requires localhost access");
    }
    next.run(req).await
}
