// Gateway errors and their HTTP mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use transfer_core::Error as CoreError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Invalid request {0} parameter")]
    InvalidParameter(&'static str),

    #[error("Service is shutting down")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidArgument(_)
            | GatewayError::Malformed(_)
            | GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<CoreError> for GatewayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument(rejection) => {
                GatewayError::InvalidArgument(rejection.to_string())
            }
            CoreError::Shutdown => GatewayError::Unavailable,
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        GatewayError::Malformed(rejection.body_text())
    }
}
