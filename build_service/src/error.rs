//! Error taxonomy for the build service and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::models::build::BuildStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BuildError {
    /// Caller-supplied data is malformed or missing.
    #[error("{0}")]
    Validation(String),

    #[error("build {0} not found")]
    NotFound(i64),

    #[error("invalid build transition from {from} to {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },

    /// Persistence or otherwise unexpected failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for BuildError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BuildError::NotFound(id),
            other => BuildError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl BuildError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BuildError::Validation(_) => StatusCode::BAD_REQUEST,
            BuildError::NotFound(_) => StatusCode::NOT_FOUND,
            BuildError::InvalidTransition { .. } => StatusCode::CONFLICT,
            BuildError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BuildError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            BuildError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err = BuildError::from(StoreError::NotFound(7));
        assert!(matches!(err, BuildError::NotFound(7)));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_outage_maps_to_internal() {
        let err = BuildError::from(StoreError::Unavailable("connection refused".into()));
        assert!(matches!(err, BuildError::Internal(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_error_body_is_generic() {
        let response = BuildError::Internal(anyhow::anyhow!("db password leaked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
