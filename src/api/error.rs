use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::jobs::{ErrorKind, FetchError, RegistryError, SubmitError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Storage(_) => "INTERNAL_STORAGE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidArgument(value.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(value: SubmitError) -> Self {
        match value {
            SubmitError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            SubmitError::ShuttingDown => ApiError::Unavailable(value.to_string()),
            SubmitError::Registry(e) => e.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match value.kind() {
            ErrorKind::NotFound => ApiError::NotFound(value.to_string()),
            ErrorKind::InternalStorage => ApiError::Storage(value.to_string()),
            _ => ApiError::Internal(value.to_string()),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::NotFound(_) => ApiError::NotFound(value.to_string()),
            FetchError::Storage(e) => ApiError::Storage(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobId;

    #[test]
    fn test_status_and_codes() {
        let err = ApiError::from(SubmitError::InvalidArgument("url must not be empty".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_ARGUMENT");

        let err = ApiError::from(RegistryError::NotFound(JobId::from("x")));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(RegistryError::IdExhausted);
        assert_eq!(err.code(), "INTERNAL_STORAGE");

        let err = ApiError::from(SubmitError::ShuttingDown);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_fetch_not_found_maps_to_404() {
        let err = ApiError::from(FetchError::NotFound(JobId::from("x")));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
