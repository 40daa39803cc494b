use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub use crate::services::error::{FailureStage, TransferError};

impl TransferError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransferError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            TransferError::Unexpected(msg) => {
                tracing::error!("Unexpected transfer error: {}", msg);
            }
            other => {
                tracing::warn!(stage = ?other.stage(), "Transfer rejected: {}", other);
            }
        }

        let body = Json(json!({
            "error": self.public_message()
        }));

        (status, body).into_response()
    }
}
