use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::geo::CoordinateError;
use crate::utils::{error_codes, error_to_api_response};

/// Crate-wide error taxonomy. Validation and conflict variants are expected
/// outcomes returned to the caller; provider and database variants are
/// retryable or fatal failures that bubble up to the handler.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),

    #[error("user already has a confirmed participation in an active group")]
    AlreadyInGroup,

    #[error("group is already full")]
    GroupFull,

    #[error("group not found")]
    GroupNotFound,

    #[error("user is not a member of this group")]
    NotAMember,

    #[error("group is not eligible for bar assignment")]
    NotEligible,

    #[error("no suitable bar found near the group")]
    NoBarFound,

    #[error("places provider error: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::InvalidCoordinates(_) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR)
            }
            AppError::AlreadyInGroup => (StatusCode::CONFLICT, error_codes::ALREADY_IN_GROUP),
            AppError::GroupFull => (StatusCode::CONFLICT, error_codes::GROUP_FULL),
            AppError::GroupNotFound => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::NotAMember => (StatusCode::BAD_REQUEST, error_codes::NOT_FOUND),
            AppError::NotEligible => (StatusCode::CONFLICT, error_codes::NOT_ELIGIBLE),
            AppError::NoBarFound => (StatusCode::NOT_FOUND, error_codes::NO_BAR_FOUND),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, error_codes::PROVIDER_ERROR),
            AppError::Database(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, error_codes::NOT_FOUND)
            }
            AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (status, error_to_api_response::<()>(code, self.to_string())).into_response()
    }
}
