//! PSK-based authentication for the admin API.
//!
//! Compares the presented key in constant time to mitigate timing attacks.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, ErrorDetails, ErrorResponse};

/// Header name carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware guarding `/api`. With no PSK configured every request passes
/// (dev mode); otherwise the `x-api-key` header must match.
pub async fn require_psk(expected_psk: Option<String>, request: Request, next: Next) -> Response {
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if keys_match(key, &expected) => next.run(request).await,
        Some(_) => unauthorized("Invalid API key"),
        None => unauthorized("Missing API key"),
    }
}

fn keys_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_keys() {
        assert!(keys_match("kit-check-key", "kit-check-key"));
    }

    #[test]
    fn mismatched_keys() {
        assert!(!keys_match("kit-check-key", "kit-check-kez"));
        assert!(!keys_match("short", "much-longer-key"));
    }

    #[test]
    fn empty_keys() {
        assert!(keys_match("", ""));
        assert!(!keys_match("", "not-empty"));
    }
}
