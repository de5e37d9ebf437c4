use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::foundation::error::SplatgenError;

/// Request-boundary error. Responses carry only a status code; the cause is logged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Pipeline(#[from] SplatgenError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) if e.is_backend_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::info!(%status, error = %self, "request refused");
        }
        status.into_response()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/server/error.rs"]
mod tests;
