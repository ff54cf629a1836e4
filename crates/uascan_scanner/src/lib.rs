//! UA Scan - Address-Space Discovery and Reconciliation
//!
//! Polls the backend for servers flagged for scanning, walks each server's
//! address space and mirrors every node into the backend, then prunes the
//! records the pass did not touch.
//!
//! - **Scheduler**: outer polling loop over the servers due for scan
//! - **Reconciler**: one pass over one server (connect, walk, reset, prune)
//! - **TreeWalker**: iterative depth-first traversal with per-node failure isolation
//! - **Composite expansion**: structured values become virtual child records
//!
//! The protocol client is consumed through [`UaConnector`] and [`UaSession`].
//! [`MemoryAddressSpace`] backs both the tests and `file://` snapshots.

pub mod address_space;
pub mod classify;
pub mod client;
pub mod composite;
pub mod config;
pub mod error;
pub mod incident;
pub mod metrics;
pub mod path;
pub mod reconciler;
pub mod scheduler;
pub mod walker;

pub use address_space::{
    Attribute, MemoryAddressSpace, MemoryConnector, MemorySession, NodeSpec, Snapshot,
    SnapshotConnector,
};
pub use classify::classify;
pub use client::{UaConnector, UaSession};
pub use config::{ConfigError, ScanConfig};
pub use error::{Result, ScanError};
pub use incident::{Incident, IncidentKind, IncidentReporter};
pub use metrics::{ScanMetrics, ScanMetricsSnapshot, SCAN_METRICS};
pub use path::{resolve_path, PathOutcome};
pub use reconciler::{PassOutcome, Reconciler, ScanPass};
pub use scheduler::{CycleReport, Scheduler};
pub use walker::{TreeWalker, WalkStats};
