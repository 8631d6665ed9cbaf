use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::videos::UploadError;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<&UploadError> for AppError {
    fn from(err: &UploadError) -> Self {
        match err {
            UploadError::InvalidVideoId
            | UploadError::UnsupportedContentType(_)
            | UploadError::MalformedForm(_)
            | UploadError::MissingVideoField => Self::bad_request(err.to_string()),
            UploadError::Unauthorized => Self::unauthorized(err.to_string()),
            UploadError::VideoNotFound => Self::not_found(err.to_string()),
            UploadError::PayloadTooLarge => Self::payload_too_large(err.to_string()),
            UploadError::Staging(_) => Self::internal("couldn't stage upload"),
            UploadError::KeyGeneration(_) => Self::internal("couldn't generate storage key"),
            UploadError::Probe(_) => Self::internal("couldn't read video geometry"),
            UploadError::FastStart(_) => Self::internal("video can't be processed"),
            UploadError::Storage(_) => Self::internal("couldn't upload video"),
            UploadError::Lookup(_) => Self::internal("couldn't get video"),
            UploadError::Persistence(_) => Self::internal("couldn't update video"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
