//! Reconciler
//!
//! One pass over one server: connect, pick the root, walk, then reset the
//! server's scan flag and prune every node record the pass did not refresh.
//! The session is released on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uascan_backend::Backend;
use uascan_protocol::{CheckTimestamp, NodeId, Server, ServerId, UaError};

use crate::client::{UaConnector, UaSession};
use crate::error::{Result, ScanError};
use crate::metrics::SCAN_METRICS;
use crate::walker::{TreeWalker, WalkStats};

/// Identity of one traversal pass.
///
/// `check_datetime` is captured once before the pass and stamped on every
/// record it writes; pruning deletes anything older.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPass {
    pub server_id: ServerId,
    pub check_datetime: CheckTimestamp,
}

impl ScanPass {
    pub fn new(server_id: ServerId, check_datetime: CheckTimestamp) -> Self {
        Self {
            server_id,
            check_datetime,
        }
    }
}

/// How a pass ended when the backend could be told about it
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Walk finished, server reset and stale nodes pruned.
    Completed(WalkStats),
    /// The server was marked erroneous with this text.
    ConnectionFailed { error: String },
}

pub struct Reconciler {
    backend: Arc<dyn Backend>,
    connector: Arc<dyn UaConnector>,
    connect_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn Backend>,
        connector: Arc<dyn UaConnector>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            connector,
            connect_timeout,
        }
    }

    /// Run one pass over `server` stamped with `check_datetime`.
    ///
    /// Connection problems are reported to the backend and returned as
    /// [`PassOutcome::ConnectionFailed`]. An `Err` means a gateway call failed,
    /// in which case the server is neither reset nor pruned.
    pub async fn reconcile(
        &self,
        server: &Server,
        check_datetime: CheckTimestamp,
    ) -> Result<PassOutcome> {
        let pass = ScanPass::new(server.id, check_datetime);
        let start = Instant::now();
        tracing::info!(server_id = %server.id, url = %server.url, "Scanning server");

        let result = match self.connect(&server.url).await {
            Ok(session) => {
                let result = self.run_session(session.as_ref(), server, pass).await;
                if let Err(e) = session.disconnect().await {
                    tracing::debug!(server_id = %server.id, error = %e, "Disconnect failed");
                }
                result
            }
            Err(error) => Err(ScanError::Connection(error)),
        };

        let outcome = match result {
            Ok(stats) => {
                SCAN_METRICS.inc_passes_completed();
                tracing::info!(
                    server_id = %server.id,
                    nodes = stats.recorded,
                    virtual_nodes = stats.virtual_recorded,
                    node_errors = stats.node_errors,
                    "Server scan complete"
                );
                Ok(PassOutcome::Completed(stats))
            }
            Err(ScanError::Connection(error)) => self.report_connection_error(pass, &error).await,
            Err(error) => {
                SCAN_METRICS.inc_passes_aborted();
                Err(error)
            }
        };
        SCAN_METRICS.record_pass_time(start);
        outcome
    }

    async fn connect(&self, url: &str) -> std::result::Result<Box<dyn UaSession>, UaError> {
        let connecting = self.connector.connect(url, self.connect_timeout);
        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(result) => result,
            Err(_) => Err(UaError::Timeout(self.connect_timeout.as_secs())),
        }
    }

    async fn run_session(
        &self,
        session: &dyn UaSession,
        server: &Server,
        pass: ScanPass,
    ) -> Result<WalkStats> {
        let root = resolve_root(session, server)
            .await
            .map_err(ScanError::Connection)?;
        let stats = TreeWalker::new(session, self.backend.as_ref(), pass)
            .walk(root)
            .await?;

        self.backend
            .reset_server(pass.server_id, pass.check_datetime)
            .await
            .map_err(gateway_failure)?;
        self.backend
            .delete_outdated_nodes(pass.server_id, pass.check_datetime)
            .await
            .map_err(gateway_failure)?;
        Ok(stats)
    }

    async fn report_connection_error(
        &self,
        pass: ScanPass,
        error: &UaError,
    ) -> Result<PassOutcome> {
        let text = error.connection_error_text();
        tracing::warn!(server_id = %pass.server_id, error = %error, "Server connection failed");
        self.backend
            .set_server_error(pass.server_id, &text, pass.check_datetime)
            .await
            .map_err(|e| {
                SCAN_METRICS.inc_passes_aborted();
                gateway_failure(e)
            })?;
        SCAN_METRICS.inc_passes_failed();
        Ok(PassOutcome::ConnectionFailed { error: text })
    }
}

fn gateway_failure(error: uascan_backend::BackendError) -> ScanError {
    SCAN_METRICS.inc_gateway_errors();
    ScanError::Backend(error)
}

/// The configured root if the server knows it, else the server's default root.
async fn resolve_root(
    session: &dyn UaSession,
    server: &Server,
) -> std::result::Result<NodeId, UaError> {
    let Some(configured) = server.configured_root() else {
        return Ok(session.root_node_id());
    };
    match session.get_node(&configured).await {
        Ok(handle) => Ok(handle),
        Err(error) if error.is_unknown_node() => {
            tracing::warn!(
                server_id = %server.id,
                root_node = %configured,
                "Configured root node unknown, using default root"
            );
            Ok(session.root_node_id())
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{MemoryAddressSpace, MemoryConnector, NodeSpec};
    use async_trait::async_trait;
    use uascan_backend::{BackendCall, MemoryBackend};

    const URL: &str = "opc.tcp://plc:4840";

    fn reconciler(backend: &MemoryBackend, connector: &MemoryConnector) -> Reconciler {
        Reconciler::new(
            Arc::new(backend.clone()),
            Arc::new(connector.clone()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_configured_root_limits_walk() {
        let connector = MemoryConnector::new();
        connector.register(
            URL,
            MemoryAddressSpace::new()
                .with_node("i=84", NodeSpec::object("Line1", "Line1"))
                .with_node("Line1", NodeSpec::object("Pump", "Pump"))
                .with_node("i=84", NodeSpec::object("Line2", "Line2")),
        );
        let backend = MemoryBackend::new();
        let server = Server::new(1, URL).with_root_node("Line1");

        let outcome = reconciler(&backend, &connector)
            .reconcile(&server, CheckTimestamp::from_epoch_secs(10))
            .await
            .unwrap();
        assert!(matches!(outcome, PassOutcome::Completed(_)));
        assert_eq!(backend.upserted_identifiers(), vec!["Line1", "Pump"]);
        assert_eq!(
            backend.node(ServerId::new(1), "Pump").unwrap().node.path,
            "/Line1/Pump"
        );
    }

    #[tokio::test]
    async fn test_setup_status_error_marks_server() {
        let connector = MemoryConnector::new();
        connector.register(
            URL,
            MemoryAddressSpace::new().with_failure(
                "ns=2;s=Root",
                crate::address_space::Attribute::Handle,
                UaError::Status(uascan_protocol::StatusCode::BAD_USER_ACCESS_DENIED),
            ),
        );
        let backend = MemoryBackend::new();
        let server = Server::new(2, URL).with_root_node("ns=2;s=Root");

        let outcome = reconciler(&backend, &connector)
            .reconcile(&server, CheckTimestamp::from_epoch_secs(10))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PassOutcome::ConnectionFailed {
                error: "UaStatusCodeError(2149515264)".to_string()
            }
        );
        assert_eq!(connector.disconnects(), 1);
        assert!(backend.upserted_identifiers().is_empty());
    }

    struct StalledConnector;

    #[async_trait]
    impl UaConnector for StalledConnector {
        async fn connect(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> std::result::Result<Box<dyn UaSession>, UaError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_connect_timeout_is_reported() {
        let backend = MemoryBackend::new();
        let reconciler = Reconciler::new(
            Arc::new(backend.clone()),
            Arc::new(StalledConnector),
            Duration::from_millis(20),
        );

        let outcome = reconciler
            .reconcile(&Server::new(3, URL), CheckTimestamp::from_epoch_secs(10))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PassOutcome::ConnectionFailed {
                error: "Timeout".to_string()
            }
        );
        assert_eq!(
            backend.calls(),
            vec![BackendCall::SetServerError {
                server_id: ServerId::new(3),
                error: "Timeout".to_string(),
                checked_at: CheckTimestamp::from_epoch_secs(10),
            }]
        );
    }

    #[tokio::test]
    async fn test_gateway_failure_skips_reset_and_prune() {
        let connector = MemoryConnector::new();
        connector.register(
            URL,
            MemoryAddressSpace::new().with_node("i=84", NodeSpec::object("A", "A")),
        );
        let backend = MemoryBackend::new();
        backend.fail_upserts_for("A");

        let result = reconciler(&backend, &connector)
            .reconcile(&Server::new(4, URL), CheckTimestamp::from_epoch_secs(10))
            .await;
        assert!(matches!(result, Err(ScanError::Backend(_))));
        assert!(!backend.calls().iter().any(|call| matches!(
            call,
            BackendCall::ResetServer { .. } | BackendCall::DeleteOutdatedNodes { .. }
        )));
        assert_eq!(connector.disconnects(), 1);
    }
}
