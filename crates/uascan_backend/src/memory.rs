//! In-memory Backend for deterministic testing
//!
//! Keeps servers and nodes in process, applies the same create/update/prune
//! semantics as the server-manager API, and records every call so tests can
//! assert on the exact call sequence of a pass.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uascan_protocol::{CheckTimestamp, NodeUpsert, Server, ServerId};

use crate::error::{BackendError, Result};
use crate::Backend;

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Available,
    ListServers,
    UpsertNode(NodeUpsert),
    ResetServer {
        server_id: ServerId,
        checked_at: CheckTimestamp,
    },
    DeleteOutdatedNodes {
        server_id: ServerId,
        checked_at: CheckTimestamp,
    },
    SetServerError {
        server_id: ServerId,
        error: String,
        checked_at: CheckTimestamp,
    },
}

/// A node record as stored by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    /// Backend record id, assigned on create and kept across updates
    pub id: i64,
    pub node: NodeUpsert,
}

#[derive(Default)]
struct State {
    available: bool,
    /// Remaining availability probes that answer false before the backend comes up
    unavailable_probes: usize,
    servers: BTreeMap<ServerId, Server>,
    nodes: BTreeMap<(ServerId, String), StoredNode>,
    next_node_id: i64,
    calls: Vec<BackendCall>,
    failing_identifiers: HashSet<String>,
    fail_listing: bool,
}

/// In-process backend store
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty, available backend
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                next_node_id: 1,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a server (replaces any server with the same id)
    pub fn add_server(&self, server: Server) {
        self.state().servers.insert(server.id, server);
    }

    pub fn server(&self, id: ServerId) -> Option<Server> {
        self.state().servers.get(&id).cloned()
    }

    /// Flag a server for scanning again, as an operator would
    pub fn request_scan(&self, id: ServerId) {
        if let Some(server) = self.state().servers.get_mut(&id) {
            server.scan_required = true;
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Answer `false` to the next `probes` availability checks
    pub fn unavailable_for(&self, probes: usize) {
        self.state().unavailable_probes = probes;
    }

    /// Make every upsert of `identifier` fail as if the backend were down
    pub fn fail_upserts_for(&self, identifier: impl Into<String>) {
        self.state().failing_identifiers.insert(identifier.into());
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    /// Insert a node record directly, bypassing the call log
    pub fn seed_node(&self, node: NodeUpsert) {
        let mut state = self.state();
        let id = state.next_node_id;
        state.next_node_id += 1;
        state
            .nodes
            .insert((node.server_id, node.identifier.clone()), StoredNode { id, node });
    }

    /// Stored nodes of one server, ordered by identifier
    pub fn nodes_for(&self, server_id: ServerId) -> Vec<StoredNode> {
        self.state()
            .nodes
            .values()
            .filter(|n| n.node.server_id == server_id)
            .cloned()
            .collect()
    }

    pub fn node(&self, server_id: ServerId, identifier: &str) -> Option<StoredNode> {
        self.state()
            .nodes
            .get(&(server_id, identifier.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Identifiers passed to `upsert_node`, in call order
    pub fn upserted_identifiers(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::UpsertNode(node) => Some(node.identifier.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn available(&self) -> bool {
        let mut state = self.state();
        state.calls.push(BackendCall::Available);
        if state.unavailable_probes > 0 {
            state.unavailable_probes -= 1;
            return false;
        }
        state.available
    }

    async fn servers_due_for_scan(&self) -> Result<Vec<Server>> {
        let mut state = self.state();
        state.calls.push(BackendCall::ListServers);
        if state.fail_listing {
            return Err(BackendError::Unavailable("server index".into()));
        }
        Ok(state
            .servers
            .values()
            .filter(|s| s.scan_required)
            .cloned()
            .collect())
    }

    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::UpsertNode(node.clone()));
        if state.failing_identifiers.contains(&node.identifier) {
            return Err(BackendError::Unavailable(format!(
                "upsert {}",
                node.identifier
            )));
        }

        let state = &mut *state;
        let key = (node.server_id, node.identifier.clone());
        match state.nodes.get_mut(&key) {
            Some(stored) => stored.node = node.clone(),
            None => {
                let id = state.next_node_id;
                state.next_node_id += 1;
                state.nodes.insert(
                    key,
                    StoredNode {
                        id,
                        node: node.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn reset_server(&self, server_id: ServerId, checked_at: CheckTimestamp) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::ResetServer {
            server_id,
            checked_at,
        });
        if let Some(server) = state.servers.get_mut(&server_id) {
            server.scan_required = false;
            server.checked_at = Some(checked_at.as_secs());
        }
        Ok(())
    }

    async fn delete_outdated_nodes(
        &self,
        server_id: ServerId,
        checked_at: CheckTimestamp,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::DeleteOutdatedNodes {
            server_id,
            checked_at,
        });
        state
            .nodes
            .retain(|(sid, _), stored| *sid != server_id || stored.node.checked_at >= checked_at);
        Ok(())
    }

    async fn set_server_error(
        &self,
        server_id: ServerId,
        error: &str,
        checked_at: CheckTimestamp,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::SetServerError {
            server_id,
            error: error.to_string(),
            checked_at,
        });
        if let Some(server) = state.servers.get_mut(&server_id) {
            server.connection_error = Some(error.to_string());
            server.checked_at = Some(checked_at.as_secs());
        }
        Ok(())
    }
}
