//! Caller identity
//!
//! Sessions are handled by the web layer in front of this service, which
//! forwards the authenticated user id in the `x-user-id` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::AppState;
use crate::constants::USER_ID_HEADER;
use crate::services::error::ApiError;

/// Extractor that reads the forwarded user id
pub struct AuthUser(pub i64);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}
