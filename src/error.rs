use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery error: {0}")]
    Notify(String),

    #[error("Scan cycle error: {0}")]
    Cycle(String),

    #[error("Scan loop unavailable")]
    LoopUnavailable,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Unknown subscriber {0}")]
    UnknownSubscriber(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a single logical page fetch, after any retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-retryable status (4xx other than 429, or an unclassified code).
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted { url: String, attempts: u32, last: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::LoopUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownSubscriber(_) => StatusCode::NOT_FOUND,
            AppError::Fetch(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
