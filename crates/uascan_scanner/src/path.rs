//! Human-readable node paths

use uascan_protocol::defaults::CANCELLED_PATH;
use uascan_protocol::{NodeId, UaError};

use crate::client::UaSession;

/// Result of resolving a node's path. Never fatal to the visit.
#[derive(Debug, Clone, PartialEq)]
pub enum PathOutcome {
    Resolved(String),
    /// Resolution failed; the placeholder is stored as the path.
    Degraded { path: String, error: UaError },
    /// Resolution failed in a way that leaves no path at all.
    Unavailable(UaError),
}

impl PathOutcome {
    /// Path to store for the node (empty when unavailable).
    pub fn path(&self) -> &str {
        match self {
            PathOutcome::Resolved(path) | PathOutcome::Degraded { path, .. } => path,
            PathOutcome::Unavailable(_) => "",
        }
    }

    pub fn error(&self) -> Option<&UaError> {
        match self {
            PathOutcome::Resolved(_) => None,
            PathOutcome::Degraded { error, .. } | PathOutcome::Unavailable(error) => Some(error),
        }
    }
}

/// Resolve `/segment/segment/...` for `node`; the default root is `/`.
pub async fn resolve_path(session: &dyn UaSession, node: &NodeId) -> PathOutcome {
    if node.is_root() {
        return PathOutcome::Resolved("/".to_string());
    }
    match session.ancestor_path(node).await {
        Ok(segments) => PathOutcome::Resolved(format!("/{}", segments.join("/"))),
        Err(error) => {
            let placeholder = match &error {
                UaError::Status(code) => Some(format!("UaStatusCodeError({})", code)),
                UaError::Cancelled => Some(CANCELLED_PATH.to_string()),
                _ => None,
            };
            match placeholder {
                Some(path) => PathOutcome::Degraded { path, error },
                None => PathOutcome::Unavailable(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{Attribute, MemoryAddressSpace, MemorySession, NodeSpec};
    use std::sync::Arc;
    use uascan_protocol::StatusCode;

    fn session(space: MemoryAddressSpace) -> MemorySession {
        MemorySession::new(Arc::new(space))
    }

    fn nested() -> MemoryAddressSpace {
        MemoryAddressSpace::new()
            .with_node("i=84", NodeSpec::object("B", "B"))
            .with_node("B", NodeSpec::object("C", "C"))
    }

    #[tokio::test]
    async fn test_root_is_slash() {
        let s = session(nested());
        assert_eq!(resolve_path(&s, &NodeId::root()).await.path(), "/");
    }

    #[tokio::test]
    async fn test_nested_path_joins_segments() {
        let s = session(nested());
        assert_eq!(
            resolve_path(&s, &NodeId::new("C")).await,
            PathOutcome::Resolved("/B/C".to_string())
        );
    }

    #[tokio::test]
    async fn test_status_error_becomes_placeholder() {
        let s = session(nested().with_failure(
            "C",
            Attribute::Path,
            UaError::Status(StatusCode::BAD_NODE_ID_UNKNOWN),
        ));
        let outcome = resolve_path(&s, &NodeId::new("C")).await;
        assert_eq!(outcome.path(), "UaStatusCodeError(2150891520)");
        assert!(outcome.error().is_some());
    }

    #[tokio::test]
    async fn test_cancellation_becomes_placeholder() {
        let s = session(nested().with_failure("C", Attribute::Path, UaError::Cancelled));
        assert_eq!(resolve_path(&s, &NodeId::new("C")).await.path(), "CancelledError");
    }

    #[tokio::test]
    async fn test_other_errors_leave_no_path() {
        let s = session(nested().with_failure(
            "C",
            Attribute::Path,
            UaError::AttributeMissing("BrowseName".into()),
        ));
        let outcome = resolve_path(&s, &NodeId::new("C")).await;
        assert!(matches!(outcome, PathOutcome::Unavailable(_)));
        assert_eq!(outcome.path(), "");
    }
}
