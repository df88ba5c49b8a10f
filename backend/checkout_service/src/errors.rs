//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use checkout_engine::{CheckoutError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Session not found: {0}")]
    SessionNotFound(u64),

    #[error("Invalid checkout record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Checkout(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::Precondition => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Api => StatusCode::BAD_GATEWAY,
            },
            Self::Http(_) | Self::GraphQl(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// The engine only sees upstream failures as `CheckoutError::Api`.
impl From<ServiceError> for CheckoutError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Checkout(inner) => inner,
            other => CheckoutError::Api(other.to_string()),
        }
    }
}
