//! Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Platform-level errors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Bad caller input
    #[error("invalid input: {0}")]
    Validation(String),

    /// Duplicate identifier
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown creator or provider account
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad admin credentials or bad webhook signature
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Creator not activated for the requested operation
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Provider or other external call failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Store read/write failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConnectError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Upstream(_) | ConnectError::Storage(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            ConnectError::Validation(_) => "The request was invalid.",
            ConnectError::Conflict(_) => "That identifier is already in use.",
            ConnectError::NotFound(_) => "Creator not found.",
            ConnectError::Authentication(_) => "Authentication failed.",
            ConnectError::Precondition(_) => "The creator has not completed onboarding.",
            ConnectError::Upstream(_) => "An external service call failed. Please try again.",
            ConnectError::Storage(_) => "A storage operation failed.",
            ConnectError::Config(_) => "Service configuration error.",
        }
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(err: reqwest::Error) -> Self {
        ConnectError::Upstream(err.to_string())
    }
}
