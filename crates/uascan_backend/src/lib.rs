//! UA Scan Backend Gateway
//!
//! The backend exclusively owns persisted server and node state. The scanner
//! talks to it only through the [`Backend`] trait, so the HTTP client can be
//! swapped for the in-memory [`MemoryBackend`] in tests.
//!
//! - **HttpBackend**: form-encoded REST calls with a bearer credential
//! - **MemoryBackend**: in-process store that records every call
//! - **RetryPolicy**: exponential backoff for transient gateway failures

pub mod error;
pub mod http;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use uascan_protocol::{CheckTimestamp, NodeUpsert, Server, ServerId};

pub use error::{BackendError, Result};
pub use http::HttpBackend;
pub use memory::{BackendCall, MemoryBackend};
pub use retry::RetryPolicy;

/// Operations the scanner needs from the backend store.
#[async_trait]
pub trait Backend: Send + Sync {
    /// True if the backend answers its health probe.
    async fn available(&self) -> bool;

    /// Servers whose scan-required flag is set.
    async fn servers_due_for_scan(&self) -> Result<Vec<Server>>;

    /// Create the node if `(server_id, identifier)` is absent, else update every mutable field.
    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()>;

    /// Clear the scan-required flag and stamp `checked_at`.
    async fn reset_server(&self, server_id: ServerId, checked_at: CheckTimestamp) -> Result<()>;

    /// Delete every node of the server whose `checked_at` is older than the pass.
    async fn delete_outdated_nodes(
        &self,
        server_id: ServerId,
        checked_at: CheckTimestamp,
    ) -> Result<()>;

    /// Record a connection failure and stamp `checked_at`.
    async fn set_server_error(
        &self,
        server_id: ServerId,
        error: &str,
        checked_at: CheckTimestamp,
    ) -> Result<()>;
}
