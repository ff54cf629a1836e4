//! Error taxonomy of the protocol client capability.

use thiserror::Error;

use crate::types::StatusCode;

/// Failures reported by a protocol client session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UaError {
    /// The server answered with a bad status code.
    #[error("UaStatusCodeError({0})")]
    Status(StatusCode),

    #[error("CancelledError")]
    Cancelled,

    /// The node does not expose the requested attribute.
    #[error("Attribute missing: {0}")]
    AttributeMissing(String),

    /// The attribute value did not decode to the expected type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Value error: {0}")]
    Value(String),

    #[error("BrokenPipeError: {0}")]
    BrokenPipe(String),

    #[error("Name resolution failed for {0}")]
    NameResolution(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("UnsupportedTransport({0})")]
    UnsupportedTransport(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl UaError {
    /// True for the distinguished "unknown node identifier" condition.
    pub fn is_unknown_node(&self) -> bool {
        matches!(self, UaError::Status(code) if *code == StatusCode::BAD_NODE_ID_UNKNOWN)
    }

    /// True when the session itself is unusable and further reads are pointless.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            UaError::BrokenPipe(_)
                | UaError::NameResolution(_)
                | UaError::Timeout(_)
                | UaError::UnsupportedTransport(_)
                | UaError::Transport(_)
        )
    }

    /// Text stored as the server's connection error when a pass is aborted.
    pub fn connection_error_text(&self) -> String {
        match self {
            UaError::Status(code) => format!("UaStatusCodeError({})", code),
            UaError::Cancelled => "CancelledError".to_string(),
            UaError::NameResolution(_) => "socket.gaierror".to_string(),
            UaError::BrokenPipe(_) => "BrokenPipeError".to_string(),
            UaError::Timeout(_) => "Timeout".to_string(),
            UaError::UnsupportedTransport(scheme) => format!("UnsupportedTransport({})", scheme),
            UaError::Transport(msg) => format!("TransportError({})", msg),
            UaError::AttributeMissing(_) => "AttributeError".to_string(),
            UaError::TypeMismatch(_) => "TypeError".to_string(),
            UaError::Value(_) => "ValueError".to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, UaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_node_detection() {
        assert!(UaError::Status(StatusCode::BAD_NODE_ID_UNKNOWN).is_unknown_node());
        assert!(!UaError::Status(StatusCode::BAD_TIMEOUT).is_unknown_node());
        assert!(!UaError::Cancelled.is_unknown_node());
    }

    #[test]
    fn test_connection_error_text() {
        assert_eq!(
            UaError::Status(StatusCode::new(2150891520)).connection_error_text(),
            "UaStatusCodeError(2150891520)"
        );
        assert_eq!(
            UaError::NameResolution("plc.local".into()).connection_error_text(),
            "socket.gaierror"
        );
    }

    #[test]
    fn test_session_fatal_classes() {
        assert!(UaError::BrokenPipe("reset".into()).is_session_fatal());
        assert!(UaError::Timeout(30).is_session_fatal());
        assert!(!UaError::Status(StatusCode::BAD_NOT_READABLE).is_session_fatal());
        assert!(!UaError::Cancelled.is_session_fatal());
    }
}
