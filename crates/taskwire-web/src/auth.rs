//! Token checks for relay endpoints.
//!
//! `POST /api/broadcast` takes the token from the `Authorization: Bearer`
//! header. Browsers cannot set headers on WebSocket upgrades, so `/ws` takes
//! it from the `token` query parameter instead.

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use taskwire_core::token::Claims;
use taskwire_core::TokenSigner;
use tracing::debug;

/// Extract the bearer token from request headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify a token, mapping every failure to `401 Unauthorized`.
pub fn authorize(signer: &TokenSigner, token: Option<&str>) -> Result<Claims, (StatusCode, String)> {
    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, "Missing token".to_string()));
    };
    signer.verify(token).map_err(|e| {
        debug!(error = %e, "Rejected token");
        (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
    })
}
