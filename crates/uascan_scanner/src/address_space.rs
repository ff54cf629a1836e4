//! In-memory address spaces
//!
//! [`MemoryAddressSpace`] models a remote node tree with per-attribute failure
//! injection. [`MemoryConnector`] serves registered spaces by URL for tests,
//! and [`SnapshotConnector`] loads `file://` JSON snapshots for the binary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use uascan_protocol::error::Result;
use uascan_protocol::{AccessLevel, NodeId, StatusCode, UaError, Variant, VariantType};

use crate::client::{UaConnector, UaSession};

/// Readable aspects of a node, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Handle,
    Path,
    AccessLevel,
    DataType,
    DisplayName,
    Value,
    Children,
}

/// One node of an address space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub display_name: String,
    #[serde(default)]
    pub access_level: AccessLevel,
    #[serde(default = "default_data_type")]
    pub data_type: VariantType,
    #[serde(default)]
    pub value: Option<Variant>,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

fn default_data_type() -> VariantType {
    VariantType::Null
}

fn default_root() -> NodeId {
    NodeId::root()
}

impl NodeSpec {
    /// A folder-like node with no value
    pub fn object(id: impl Into<NodeId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            access_level: AccessLevel::NONE,
            data_type: VariantType::Null,
            value: None,
            children: Vec::new(),
        }
    }

    /// A readable variable node
    pub fn variable(
        id: impl Into<NodeId>,
        display_name: impl Into<String>,
        data_type: VariantType,
        value: Variant,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            access_level: AccessLevel::CURRENT_READ,
            data_type,
            value: Some(value),
            children: Vec::new(),
        }
    }

    pub fn with_access(mut self, access_level: AccessLevel) -> Self {
        self.access_level = access_level;
        self
    }
}

/// Serialized form of an address space, as stored in `file://` snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_root")]
    pub root: NodeId,
    pub nodes: Vec<NodeSpec>,
}

/// A node tree held in memory
#[derive(Debug, Clone)]
pub struct MemoryAddressSpace {
    root: NodeId,
    nodes: HashMap<NodeId, NodeSpec>,
    /// First parent that referenced each node; defines its path.
    parents: HashMap<NodeId, NodeId>,
    failures: HashMap<(NodeId, Attribute), UaError>,
}

impl Default for MemoryAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAddressSpace {
    /// An address space holding only the default root folder.
    pub fn new() -> Self {
        let root = NodeId::root();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), NodeSpec::object(root.clone(), "Root"));
        Self {
            root,
            nodes,
            parents: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Build from a snapshot. Parents are taken from the first `children` list naming each node.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut space = Self {
            root: snapshot.root,
            nodes: HashMap::new(),
            parents: HashMap::new(),
            failures: HashMap::new(),
        };
        for node in &snapshot.nodes {
            for child in &node.children {
                if *child != space.root {
                    space
                        .parents
                        .entry(child.clone())
                        .or_insert_with(|| node.id.clone());
                }
            }
        }
        for node in snapshot.nodes {
            space.nodes.insert(node.id.clone(), node);
        }
        space
    }

    /// Serialize the tree, nodes ordered by identifier.
    pub fn snapshot(&self) -> Snapshot {
        let mut nodes: Vec<NodeSpec> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot {
            root: self.root.clone(),
            nodes,
        }
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// Add `node` as the last child of `parent`.
    pub fn insert(&mut self, parent: &NodeId, node: NodeSpec) {
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(node.id.clone());
        }
        self.parents
            .entry(node.id.clone())
            .or_insert_with(|| parent.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn with_node(mut self, parent: impl Into<NodeId>, node: NodeSpec) -> Self {
        self.insert(&parent.into(), node);
        self
    }

    /// Add an extra child reference without moving the target (may create cycles).
    pub fn link(&mut self, from: &NodeId, to: &NodeId) {
        if let Some(node) = self.nodes.get_mut(from) {
            node.children.push(to.clone());
        }
    }

    pub fn remove(&mut self, id: &NodeId) {
        self.nodes.remove(id);
        self.parents.remove(id);
        for node in self.nodes.values_mut() {
            node.children.retain(|child| child != id);
        }
    }

    /// Make every read of `attribute` on `node` fail with `error`.
    pub fn fail(&mut self, node: impl Into<NodeId>, attribute: Attribute, error: UaError) {
        self.failures.insert((node.into(), attribute), error);
    }

    pub fn with_failure(
        mut self,
        node: impl Into<NodeId>,
        attribute: Attribute,
        error: UaError,
    ) -> Self {
        self.fail(node, attribute, error);
        self
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    fn lookup(&self, id: &NodeId, attribute: Attribute) -> Result<&NodeSpec> {
        if let Some(error) = self.failures.get(&(id.clone(), attribute)) {
            return Err(error.clone());
        }
        self.nodes
            .get(id)
            .ok_or(UaError::Status(StatusCode::BAD_NODE_ID_UNKNOWN))
    }

    fn segments(&self, id: &NodeId) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        let mut current = self.lookup(id, Attribute::Path)?;
        while let Some(parent) = self.parents.get(&current.id) {
            if segments.len() > self.nodes.len() {
                return Err(UaError::Value(format!("cyclic parent chain at {}", id)));
            }
            segments.push(current.display_name.clone());
            current = self
                .nodes
                .get(parent)
                .ok_or(UaError::Status(StatusCode::BAD_NODE_ID_UNKNOWN))?;
        }
        segments.reverse();
        Ok(segments)
    }
}

/// Session over a shared in-memory address space
pub struct MemorySession {
    space: Arc<MemoryAddressSpace>,
    disconnects: Arc<AtomicUsize>,
}

impl MemorySession {
    pub fn new(space: Arc<MemoryAddressSpace>) -> Self {
        Self {
            space,
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl UaSession for MemorySession {
    fn root_node_id(&self) -> NodeId {
        self.space.root.clone()
    }

    async fn get_node(&self, id: &NodeId) -> Result<NodeId> {
        Ok(self.space.lookup(id, Attribute::Handle)?.id.clone())
    }

    async fn ancestor_path(&self, id: &NodeId) -> Result<Vec<String>> {
        self.space.segments(id)
    }

    async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        Ok(self.space.lookup(id, Attribute::Children)?.children.clone())
    }

    async fn user_access_level(&self, id: &NodeId) -> Result<AccessLevel> {
        Ok(self.space.lookup(id, Attribute::AccessLevel)?.access_level)
    }

    async fn data_type(&self, id: &NodeId) -> Result<VariantType> {
        Ok(self.space.lookup(id, Attribute::DataType)?.data_type)
    }

    async fn display_name(&self, id: &NodeId) -> Result<String> {
        Ok(self.space.lookup(id, Attribute::DisplayName)?.display_name.clone())
    }

    async fn value(&self, id: &NodeId) -> Result<Variant> {
        let node = self.space.lookup(id, Attribute::Value)?;
        Ok(node.value.clone().unwrap_or(Variant::Null))
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct ConnectorState {
    spaces: HashMap<String, Arc<MemoryAddressSpace>>,
    connect_failures: HashMap<String, UaError>,
    connects: usize,
}

/// Connector serving registered address spaces by URL
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    disconnects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `space` at `url`, replacing any earlier registration.
    pub fn register(&self, url: impl Into<String>, space: MemoryAddressSpace) {
        self.state().spaces.insert(url.into(), Arc::new(space));
    }

    /// Fail every connection attempt to `url` with `error`.
    pub fn fail_connect(&self, url: impl Into<String>, error: UaError) {
        self.state().connect_failures.insert(url.into(), error);
    }

    /// Successful connections so far
    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UaConnector for MemoryConnector {
    async fn connect(&self, url: &str, _timeout: Duration) -> Result<Box<dyn UaSession>> {
        let mut state = self.state();
        if let Some(error) = state.connect_failures.get(url) {
            return Err(error.clone());
        }
        let space = state
            .spaces
            .get(url)
            .cloned()
            .ok_or_else(|| UaError::NameResolution(host_of(url)))?;
        state.connects += 1;
        Ok(Box::new(MemorySession {
            space,
            disconnects: Arc::clone(&self.disconnects),
        }))
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Connector that loads `file://` URLs as JSON snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotConnector;

impl SnapshotConnector {
    pub async fn load(url: &str) -> Result<MemoryAddressSpace> {
        let parsed = Url::parse(url)
            .map_err(|e| UaError::Transport(format!("invalid server URL {}: {}", url, e)))?;
        if parsed.scheme() != "file" {
            return Err(UaError::UnsupportedTransport(parsed.scheme().to_string()));
        }
        let path = parsed
            .to_file_path()
            .map_err(|_| UaError::Transport(format!("not a local path: {}", url)))?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| UaError::Transport(format!("{}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            UaError::Transport(format!("invalid snapshot {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), nodes = snapshot.nodes.len(), "Loaded snapshot");
        Ok(MemoryAddressSpace::from_snapshot(snapshot))
    }
}

#[async_trait]
impl UaConnector for SnapshotConnector {
    async fn connect(&self, url: &str, _timeout: Duration) -> Result<Box<dyn UaSession>> {
        let space = Self::load(url).await?;
        Ok(Box::new(MemorySession::new(Arc::new(space))))
    }
}
