//! Protocol client capability
//!
//! The scanner never speaks the wire protocol itself. A transport implements
//! [`UaConnector`] to open sessions, and each [`UaSession`] answers node-level
//! reads. Errors use the shared [`UaError`] taxonomy so the walker can tell
//! soft per-node failures from a lost session.

use async_trait::async_trait;
use std::time::Duration;

use uascan_protocol::error::Result;
use uascan_protocol::{AccessLevel, NodeId, Variant, VariantType};

/// Opens protocol sessions to remote servers.
#[async_trait]
pub trait UaConnector: Send + Sync {
    /// Connect to `url`, giving up after `timeout`.
    async fn connect(&self, url: &str, timeout: Duration) -> Result<Box<dyn UaSession>>;
}

/// One open session against a remote address space.
#[async_trait]
pub trait UaSession: Send + Sync {
    /// The server's default top-of-tree node.
    fn root_node_id(&self) -> NodeId {
        NodeId::root()
    }

    /// Look a node up by identifier, returning a fresh handle.
    ///
    /// Fails with `BadNodeIdUnknown` when the server has no such node.
    async fn get_node(&self, id: &NodeId) -> Result<NodeId>;

    /// Display-name segments from below the top of the tree down to `id`, inclusive.
    async fn ancestor_path(&self, id: &NodeId) -> Result<Vec<String>>;

    /// Direct children in browse order.
    async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>>;

    async fn user_access_level(&self, id: &NodeId) -> Result<AccessLevel>;

    async fn data_type(&self, id: &NodeId) -> Result<VariantType>;

    async fn display_name(&self, id: &NodeId) -> Result<String>;

    /// Current value of the node.
    async fn value(&self, id: &NodeId) -> Result<Variant>;

    async fn disconnect(&self) -> Result<()>;
}
