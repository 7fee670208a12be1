use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use zenflow_core::error::ZenflowError;

/// A `ZenflowError` rendered as a JSON HTTP response.
pub struct ApiError(pub ZenflowError);

impl From<ZenflowError> for ApiError {
    fn from(e: ZenflowError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ZenflowError::MalformedGraph(_) | ZenflowError::Json(_) => StatusCode::BAD_REQUEST,
            ZenflowError::FlowNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = serde_json::json!({
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
