use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Amount out of range")]
    AmountOutOfRange,

    #[error("Recipient account not found")]
    RecipientNotFound,

    #[error("Cannot transfer money to yourself")]
    SelfTransferNotAllowed,

    #[error("A user with this phone number already exists")]
    PhoneAlreadyRegistered,

    #[error("Invalid phone number or PIN")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidAmount
            | AppError::AmountOutOfRange
            | AppError::SelfTransferNotAllowed => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::InsufficientBalance => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::RecipientNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::PhoneAlreadyRegistered => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidCredentials | AppError::SessionExpired | AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Persistence(msg) => {
                tracing::error!("Persistence error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
