//! Authenticated caller.
//!
//! The gateway verifies the access token and forwards the user id in
//! `x-user-id`; services trust that header and nothing else.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use shared_types::UserId;
use sm_01_rate_limiter::middleware::USER_ID_HEADER;
use tracing::warn;

use crate::error::ServiceError;

/// The user the gateway authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(UserId::new(v)))
            .ok_or_else(|| {
                warn!(path = %parts.uri.path(), "Access attempted without user id");
                ServiceError::Unauthenticated
            })
    }
}
