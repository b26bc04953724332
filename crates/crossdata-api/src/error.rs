//! # API Error Types
//!
//! Unified error handling for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crossdata_analytics::AnalyticsError;
use crossdata_domain::DomainError;
use crossdata_storage::SourceError;
use thiserror::Error;

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        Self::Analytics(AnalyticsError::Source(err))
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl ApiError {
    /// Get HTTP status code for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::Analytics(AnalyticsError::InvalidParameter(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Analytics(AnalyticsError::Source(source)) => match source {
                SourceError::NotFound { .. } => StatusCode::NOT_FOUND,
                SourceError::Unavailable { .. } | SourceError::Timeout { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SourceError::IoFailure { .. } | SourceError::ListingFailed { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
        }
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::Analytics(AnalyticsError::InvalidParameter(_)) => {
                "INVALID_INPUT"
            }
            Self::Analytics(AnalyticsError::Source(source)) => match source {
                SourceError::NotFound { .. } => "TABLE_NOT_FOUND",
                SourceError::Unavailable { .. } => "TABLE_UNAVAILABLE",
                SourceError::Timeout { .. } => "LOAD_TIMEOUT",
                SourceError::IoFailure { .. } => "SOURCE_IO_FAILURE",
                SourceError::ListingFailed { .. } => "SOURCE_LISTING_FAILED",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, code = self.error_code(), "Request failed");
        }
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": self.error_code(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
