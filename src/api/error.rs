//! HTTP mapping of [`EcommerceError`].

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::EcommerceError;

#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self { Self(err) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self(EcommerceError::invalid(rejection.body_text())) }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            EcommerceError::InvalidData(_) => StatusCode::BAD_REQUEST,
            EcommerceError::NotAllowed(_) => StatusCode::FORBIDDEN,
            EcommerceError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            EcommerceError::Busy(_) => StatusCode::CONFLICT,
            EcommerceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            EcommerceError::Storage(detail) => {
                tracing::error!(error = %detail, "storage failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({ "error": message, "retryable": self.0.is_retryable() });
        (status, Json(body)).into_response()
    }
}
