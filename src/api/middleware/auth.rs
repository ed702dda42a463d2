//! Shared-secret check for report and control routes
//!
//! Devices send the hub secret as `Authorization: Bearer <token>`. Missing or malformed
//! headers are answered with 401, a wrong secret with 403. The body uses the same
//! `{success, message}` shape as the report endpoints so device firmware only has to
//! parse one response type.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::ReportResponse;

/// Reasons a request is turned away before it reaches a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Invalid Authorization format (expected: Bearer <token>)")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,
}

impl AuthError {
    fn status(self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        }
    }
}

/// Pull the bearer token out of the request headers
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

/// Reject the request unless it carries `secret`
pub async fn require_secret(
    State(secret): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?;
    if token != secret {
        warn!("rejected {} {}: wrong secret", request.method(), request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(ReportResponse::rejected(self.to_string()))).into_response()
    }
}
