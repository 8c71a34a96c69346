use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::password::HashError;
use crate::store::StoreError;

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors surfaced to HTTP clients. Messages for 5xx variants are fixed;
/// details are logged where the error is classified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InputInvalid(String),
    #[error("Invalid credentials")]
    Unauthorized,
    #[error("Insufficient privileges")]
    Forbidden,
    #[error("User already exists")]
    Conflict,
    #[error("Service temporarily unavailable")]
    StoreTimeout,
    #[error("Service temporarily unavailable")]
    StoreUnavailable,
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::StoreTimeout | ApiError::StoreUnavailable | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => ApiError::Unauthorized,
            StoreError::DuplicateKey => ApiError::Conflict,
            StoreError::Timeout => {
                tracing::error!("store timeout");
                ApiError::StoreTimeout
            }
            StoreError::Unavailable(e) => {
                tracing::error!(error = %e, "store unavailable");
                ApiError::StoreUnavailable
            }
            StoreError::Decode(e) => {
                tracing::error!(error = %e, "stored document could not be decoded");
                ApiError::Internal
            }
        }
    }
}

impl From<HashError> for ApiError {
    fn from(error: HashError) -> Self {
        match error {
            HashError::InputTooLarge => ApiError::InputInvalid(error.to_string()),
            HashError::Malformed | HashError::Hashing(_) => {
                tracing::error!(error = %error, "password hashing failed");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InputInvalid(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::InputInvalid("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::StoreTimeout.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_are_classified_without_leaking_details() {
        let err = ApiError::from(StoreError::Unavailable("connection refused at 10.0.0.3".into()));
        assert_eq!(err, ApiError::StoreUnavailable);
        assert!(!err.to_string().contains("10.0.0.3"));

        assert_eq!(ApiError::from(StoreError::Timeout), ApiError::StoreTimeout);
        assert_eq!(ApiError::from(StoreError::DuplicateKey), ApiError::Conflict);
        assert_eq!(
            ApiError::from(StoreError::Decode("bad".into())),
            ApiError::Internal
        );
    }

    #[test]
    fn oversized_password_is_client_error() {
        let err = ApiError::from(HashError::InputTooLarge);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
