use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::RelayError;

/// `{"message": ...}` body with a status code.
///
/// Every control endpoint except health answers with this shape, success
/// or failure, so the extension can show `message` verbatim.
#[must_use]
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    /// 400 for a `/start` without `?ip=`.
    pub fn missing_address() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Missing ?ip=")
    }

    /// 500 for any failure to get the receiver playing.
    pub fn start_failed() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "AirPlay start failed.")
    }
}

impl From<RelayError> for ApiResponse {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::MissingAddress => Self::missing_address(),
            other => {
                tracing::error!(error = %other, "start failed");
                Self::start_failed()
            }
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = Json(MessageBody {
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}
