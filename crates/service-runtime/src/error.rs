//! Service and runtime errors.
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Validation` | 400 |
//! | `Unauthenticated` | 401 |
//! | `NotFound` | 404 |
//! | `Infrastructure` | 503 |
//! | `Internal` | 500 |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shared_bus::BusError;
use shared_store::StoreError;
use shared_types::EventError;
use sm_02_cache_manager::CacheError;
use sm_03_consistency::CoordinatorError;
use thiserror::Error;

use crate::config::ConfigError;

/// Request-path failures of the post, search and media services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required! Please login to continue")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Store, cache or broker unreachable. Never a client error.
    #[error("infrastructure unavailable: {0}")]
    Infrastructure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Infrastructure(e.to_string())
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Serialization { .. } | CacheError::EmptyPrefix => {
                Self::Internal(e.to_string())
            }
            CacheError::Store(e) => e.into(),
        }
    }
}

impl From<BusError> for ServiceError {
    fn from(e: BusError) -> Self {
        Self::Infrastructure(e.to_string())
    }
}

impl From<EventError> for ServiceError {
    fn from(e: EventError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<CoordinatorError> for ServiceError {
    fn from(e: CoordinatorError) -> Self {
        if e.is_transient() {
            Self::Infrastructure(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Infrastructure(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// Startup and serving failures of the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shared store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("event bus unavailable: {0}")]
    Bus(#[from] BusError),

    #[error("http server failed: {0}")]
    Io(#[from] std::io::Error),
}
