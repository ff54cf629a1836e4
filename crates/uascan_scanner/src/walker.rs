//! Tree Walker
//!
//! Depth-first pre-order traversal of a remote address space with an explicit
//! work stack and a per-pass visited set. Each visit resolves the node's
//! path, re-fetches its handle, reads its metadata and upserts it; structured
//! values are expanded into virtual records. A failed visit never stops the
//! walk from descending into the node's children.

use std::collections::HashSet;

use uascan_backend::Backend;
use uascan_protocol::{NodeId, NodeUpsert, UaError, Variant};

use crate::client::UaSession;
use crate::composite;
use crate::error::{Result, ScanError};
use crate::metrics::SCAN_METRICS;
use crate::path::resolve_path;
use crate::reconciler::ScanPass;

/// Counters for one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub visited: usize,
    pub recorded: usize,
    pub virtual_recorded: usize,
    /// Visits whose own processing failed softly
    pub node_errors: usize,
    /// Child references skipped because the node was already visited
    pub revisits: usize,
}

/// What a visit wrote once its own record was stored
struct Visit {
    virtual_count: usize,
    /// Value read of a structured node failed after its record was stored
    value_error: Option<UaError>,
}

impl Visit {
    fn recorded(virtual_count: usize) -> Self {
        Self {
            virtual_count,
            value_error: None,
        }
    }
}

/// Why a single visit did not record its node
enum VisitFailure {
    Node(UaError),
    Backend(uascan_backend::BackendError),
}

impl From<UaError> for VisitFailure {
    fn from(error: UaError) -> Self {
        VisitFailure::Node(error)
    }
}

impl From<uascan_backend::BackendError> for VisitFailure {
    fn from(error: uascan_backend::BackendError) -> Self {
        VisitFailure::Backend(error)
    }
}

pub struct TreeWalker<'a> {
    session: &'a dyn UaSession,
    backend: &'a dyn Backend,
    pass: ScanPass,
}

impl<'a> TreeWalker<'a> {
    pub fn new(session: &'a dyn UaSession, backend: &'a dyn Backend, pass: ScanPass) -> Self {
        Self {
            session,
            backend,
            pass,
        }
    }

    /// Walk the subtree under `root`.
    ///
    /// Fails only when a gateway call fails after retries or the session is
    /// lost while enumerating children; everything else is absorbed per node.
    pub async fn walk(&self, root: NodeId) -> Result<WalkStats> {
        let mut stats = WalkStats::default();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![root];

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id.clone()) {
                stats.revisits += 1;
                continue;
            }
            stats.visited += 1;

            match self.visit(&node_id).await {
                Ok(visit) => {
                    stats.recorded += 1;
                    stats.virtual_recorded += visit.virtual_count;
                    SCAN_METRICS.inc_nodes_recorded();
                    SCAN_METRICS.add_virtual_nodes_recorded(visit.virtual_count as u64);
                    if let Some(error) = visit.value_error {
                        stats.node_errors += 1;
                        SCAN_METRICS.inc_node_errors();
                        log_node_error(&node_id, &error);
                    }
                }
                Err(VisitFailure::Node(error)) => {
                    stats.node_errors += 1;
                    SCAN_METRICS.inc_node_errors();
                    log_node_error(&node_id, &error);
                }
                Err(VisitFailure::Backend(error)) => {
                    SCAN_METRICS.inc_gateway_errors();
                    return Err(ScanError::Backend(error));
                }
            }

            match self.session.children(&node_id).await {
                Ok(children) => {
                    // Reversed so the first child is popped first.
                    stack.extend(children.into_iter().rev());
                }
                Err(error) if error.is_session_fatal() => {
                    tracing::warn!(
                        server_id = %self.pass.server_id,
                        node = %node_id,
                        error = %error,
                        "Session lost while browsing"
                    );
                    return Err(ScanError::Connection(error));
                }
                Err(error) => {
                    stats.node_errors += 1;
                    SCAN_METRICS.inc_node_errors();
                    log_node_error(&node_id, &error);
                }
            }
        }

        tracing::debug!(
            server_id = %self.pass.server_id,
            visited = stats.visited,
            recorded = stats.recorded,
            virtual_recorded = stats.virtual_recorded,
            node_errors = stats.node_errors,
            "Walk finished"
        );
        Ok(stats)
    }

    /// Record one node, then expand its value if it is structured.
    async fn visit(&self, node_id: &NodeId) -> std::result::Result<Visit, VisitFailure> {
        let path = resolve_path(self.session, node_id).await;
        if let Some(error) = path.error() {
            tracing::debug!(node = %node_id, error = %error, "Path resolution degraded");
        }

        let handle = self.session.get_node(node_id).await?;
        let access = self.session.user_access_level(&handle).await?;
        let data_type = self.session.data_type(&handle).await?;
        let display_name = match self.session.display_name(&handle).await {
            Ok(name) => name,
            Err(UaError::Status(code)) => format!("UaStatusCodeError({})", code),
            Err(error) => return Err(error.into()),
        };

        let record = NodeUpsert {
            server_id: self.pass.server_id,
            identifier: handle.as_str().to_string(),
            display_name,
            path: path.path().to_string(),
            readable: access.readable(),
            writable: access.writable(),
            data_type: data_type.as_str().to_string(),
            checked_at: self.pass.check_datetime,
            is_virtual: false,
            parent_identifier: None,
        };
        self.backend.upsert_node(&record).await?;

        if !data_type.is_structured() {
            return Ok(Visit::recorded(0));
        }
        let object = match self.session.value(&handle).await {
            Ok(Variant::ExtensionObject(object)) => object,
            Ok(other) => {
                tracing::debug!(
                    node = %node_id,
                    value = ?other,
                    "Structured node without a decoded object"
                );
                return Ok(Visit::recorded(0));
            }
            Err(error) => {
                return Ok(Visit {
                    virtual_count: 0,
                    value_error: Some(error),
                });
            }
        };
        let fields = composite::expand(&record, &object);
        for field in &fields {
            self.backend.upsert_node(field).await?;
        }
        Ok(Visit::recorded(fields.len()))
    }
}

fn log_node_error(node_id: &NodeId, error: &UaError) {
    match error {
        UaError::Status(_) | UaError::AttributeMissing(_) => {
            tracing::debug!(node = %node_id, error = %error, "Node skipped");
        }
        _ => {
            tracing::warn!(node = %node_id, error = %error, "Node skipped");
        }
    }
}
