use thiserror::Error;

use crate::models::FailureReason;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Network/HTTP error: {0}")]
    Request(String),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP status error: {0}")]
    Status(String),
    #[error("Unexpected Content-Type: {content_type}. Response: {snippet}...")]
    UnexpectedContentType {
        content_type: String,
        snippet: String,
    },
    #[error("Image decode error: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    /// Failure category recorded for an attempt that ended with this error.
    pub fn reason(&self) -> FailureReason {
        match self {
            GenerationError::Timeout => FailureReason::Timeout,
            GenerationError::Request(_) | GenerationError::Status(_) => {
                FailureReason::TransportError
            }
            GenerationError::UnexpectedContentType { .. } => FailureReason::UnexpectedContentType,
            _ => FailureReason::InternalError,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_status() {
            GenerationError::Status(e.to_string())
        } else if e.is_decode() {
            GenerationError::Serialization(e.to_string())
        } else {
            GenerationError::Request(e.to_string())
        }
    }
}

impl From<image::ImageError> for GenerationError {
    fn from(e: image::ImageError) -> Self {
        GenerationError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(e: serde_json::Error) -> Self {
        GenerationError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
