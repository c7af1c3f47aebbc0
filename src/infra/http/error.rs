use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    timestamp: Option<OffsetDateTime>,
}

/// JSON error response for the demo API.
///
/// Not-found responses carry just `error`; simulated server failures add a
/// `message` and a `timestamp` so clients can surface when the failure
/// happened.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: Option<String>,
    timestamp: Option<OffsetDateTime>,
}

impl ApiError {
    pub fn not_found(error: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error,
            message: None,
            timestamp: None,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Server error",
            message: Some(message.into()),
            timestamp: Some(OffsetDateTime::now_utc()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.error.to_string(),
            message: self.message,
            timestamp: self.timestamp,
        };
        (self.status, Json(body)).into_response()
    }
}
