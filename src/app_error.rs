use std::fmt;

use lambda_http::http::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Client => f.write_str("client"),
            ErrorCategory::Server => f.write_str("server"),
        }
    }
}

/// Error carried through the handler chain until `slack_requests` turns it
/// into a response. `message` is safe to show to the caller, `cause` is for logs only.
#[derive(Error, Debug)]
#[error("{} ({}): {}", .status.as_u16(), .category, .message)]
pub struct AppError {
    status: StatusCode,
    message: String,
    category: ErrorCategory,
    #[source]
    cause: Option<BoxError>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            status,
            message: message.into(),
            category,
            cause: None,
        }
    }

    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message, ErrorCategory::Client)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, ErrorCategory::Server)
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn cause(&self) -> Option<&BoxError> {
        self.cause.as_ref()
    }
}
