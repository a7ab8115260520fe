//! CSRF double-submit protection.
//!
//! Safe methods set a fresh random token cookie (readable by the page,
//! `SameSite=Strict`). State-changing methods must echo the cookie value
//! in `X-CSRF-Token`; cookie and header are compared in constant time.
//! The auth-status probe and the two agent-called endpoints are exempt —
//! agents send bearer keys, not browser cookies.

use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::api_error;

pub const CSRF_COOKIE: &str = "sentinel_csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Endpoints that agents call programmatically, plus the auth probe.
const EXEMPT_PATHS: &[&str] = &[
    "/v1/auth/status",
    "/v1/policy/evaluate",
    "/v1/outbound/test",
];

pub async fn csrf_protect(req: Request<Body>, next: Next) -> Response {
    let safe = matches!(
        *req.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    );

    if !safe && !EXEMPT_PATHS.contains(&req.uri().path()) {
        let cookie = cookie_value(req.headers(), CSRF_COOKIE);
        let header = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let valid = match (&cookie, &header) {
            (Some(c), Some(h)) if !c.is_empty() => {
                bool::from(c.as_bytes().ct_eq(h.as_bytes()))
            }
            _ => false,
        };
        if !valid {
            return api_error(StatusCode::FORBIDDEN, "CSRF token invalid");
        }
    }

    let mut response = next.run(req).await;

    if safe {
        let token = generate_token();
        let cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Find a cookie by name across all `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some((key, value)) = pair.split_once('=') {
                if key == name {
                    return Some(value.to_owned());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn cookie_parsing_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; sentinel_csrf_token=abc123; more=2"),
        );
        assert_eq!(
            cookie_value(&headers, CSRF_COOKIE).as_deref(),
            Some("abc123")
        );
        assert!(cookie_value(&headers, "absent").is_none());
    }
}
