//! Error types for a scan pass

use thiserror::Error;
use uascan_backend::BackendError;
use uascan_protocol::UaError;

/// Failures that end a server's pass early
#[derive(Error, Debug)]
pub enum ScanError {
    /// The session could not be opened, set up, or was lost mid-walk.
    /// Reported to the backend as the server's connection error.
    #[error("Connection error: {0}")]
    Connection(UaError),

    /// A gateway call still failed after retries.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;
