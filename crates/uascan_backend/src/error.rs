//! Error types for the backend gateway

use thiserror::Error;

/// Backend gateway error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Decode error in {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    /// Injected by the in-memory backend to simulate an outage.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => !e.is_builder() && !e.is_decode(),
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            BackendError::Unavailable(_) => true,
            BackendError::Decode { .. } | BackendError::Config(_) => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BackendError>;
