use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Wire shape for every failure: `{"error": "..."}`. The quota code
/// `AI_LIMIT_EXCEEDED` is the only machine-readable value; the client keys
/// its upgrade prompt off it.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("AI_LIMIT_EXCEEDED")]
    QuotaExceeded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::QuotaExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "AI_LIMIT_EXCEEDED".to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(_) => {
                // Don't leak internal error detail to client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse { error });

        (status, body).into_response()
    }
}

impl From<crate::usecases::generation::GenerationError> for AppError {
    fn from(err: crate::usecases::generation::GenerationError) -> Self {
        use crate::usecases::generation::GenerationError;
        match err {
            GenerationError::QuotaExceeded => AppError::QuotaExceeded,
            GenerationError::Provider(source) => AppError::Internal(source),
        }
    }
}

impl From<crate::usecases::billing::BillingError> for AppError {
    fn from(err: crate::usecases::billing::BillingError) -> Self {
        use crate::usecases::billing::BillingError;
        match err {
            BillingError::MissingEmail => AppError::BadRequest(err.to_string()),
            BillingError::InvalidWebhook(msg) => AppError::BadRequest(msg),
            BillingError::Internal(source) => AppError::Internal(source),
        }
    }
}
