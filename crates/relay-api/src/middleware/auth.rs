//! Bearer token check for the admin surface.
//!
//! The presented token is compared with `ADMIN_TOKEN` in constant time.
//! Without a configured token every admin request is refused.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{handlers::error_response, AppState};

/// Extracts the token from a `Bearer <token>` Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Errors that can occur during admin authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No admin token configured; the surface is closed.
    Disabled,
    /// The Authorization header is missing from the request.
    MissingHeader,
    /// The presented token does not match.
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Disabled => "Admin access is disabled",
            Self::MissingHeader => "Missing Authorization header",
            Self::InvalidToken => "Invalid admin token",
        };

        error_response(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

/// Checks `presented` against `expected` without leaking where they differ.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

/// Axum middleware guarding the admin routes.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let expected = state.admin_token.as_ref().ok_or(AuthError::Disabled)?;
    let presented = extract_bearer(req.headers()).ok_or(AuthError::MissingHeader)?;

    if !tokens_match(expected.expose_secret(), presented) {
        warn!("Rejected admin request with invalid token");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer admin-token-123"));

        assert_eq!(extract_bearer(&headers), Some("admin-token-123"));
    }

    #[test]
    fn extract_bearer_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic YWRtaW4="));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("admin-token-123", "admin-token-123"));
        assert!(!tokens_match("admin-token-123", "admin-token-124"));
        assert!(!tokens_match("admin-token-123", "admin-token"));
        assert!(!tokens_match("admin-token-123", ""));
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        for err in [AuthError::Disabled, AuthError::MissingHeader, AuthError::InvalidToken] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
