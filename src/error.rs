use reqwest::StatusCode;
use thiserror::Error;

/// A categorized failure from one of the Google REST APIs.
///
/// Every remote call in this service reduces to one of these variants so the
/// pipeline steps can log a stable `category` field and degrade without ever
/// propagating a raw transport error upward.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("too many requests: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out: {0}")]
    DeadlineExceeded(String),
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Maps a non-success HTTP status to its failure category.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => ApiError::InvalidArgument(message),
            401 | 403 => ApiError::PermissionDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited(message),
            503 => ApiError::Unavailable(message),
            504 => ApiError::DeadlineExceeded(message),
            status => ApiError::Api { status, message },
        }
    }

    /// Stable category string, logged as the `category` field.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "invalid_argument",
            ApiError::PermissionDenied(_) => "permission_denied",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::DeadlineExceeded(_) => "deadline_exceeded",
            ApiError::Api { .. } => "api_error",
            ApiError::Transport(_) => "transport",
            ApiError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::DeadlineExceeded(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err)
        }
    }
}
