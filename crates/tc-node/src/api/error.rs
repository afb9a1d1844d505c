use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tc_hash_chain::ChainError;

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ChainError);

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ChainError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,
            ChainError::NotFound { .. } | ChainError::UnknownAuthority { .. } => {
                StatusCode::NOT_FOUND
            }
            ChainError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ChainError::UpstreamUnavailable { .. }
            | ChainError::PersistenceFault { .. }
            | ChainError::WriterBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ChainError::InvariantViolation { .. } | ChainError::ChainHalted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[tc] Request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
