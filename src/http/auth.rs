//! Bearer-token guard for the protected API routes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::HttpError;

/// Accepts `Authorization: Bearer <token>` matching the configured token.
///
/// With no token configured every request passes.
pub async fn require_bearer(
    State(api_token): State<Option<Arc<String>>>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let Some(expected) = api_token else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match check_bearer(header, &expected) {
        Ok(()) => Ok(next.run(request).await),
        Err(reason) => {
            log::warn!("🔒 Unauthorized {}: {}", request.uri().path(), reason);
            Err(HttpError::Unauthorized)
        }
    }
}

fn check_bearer(header: Option<&str>, expected: &str) -> Result<(), &'static str> {
    let header = header.ok_or("missing authorization header")?;
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err("malformed authorization header");
    }
    if parts[1].as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err("invalid token")
    }
}
