//! Incidents raised by the scheduler for out-of-band error reporting

use async_trait::async_trait;
use serde::Serialize;
use uascan_protocol::{CheckTimestamp, ServerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// A server could not be connected to or its session was lost.
    Connection,
    /// A backend call failed after retries.
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub kind: IncidentKind,
    /// None when the failure was not tied to one server (e.g. listing servers).
    pub server_id: Option<ServerId>,
    pub check_datetime: CheckTimestamp,
    pub message: String,
}

/// Receives incidents; implementations must not block the scan loop for long.
#[async_trait]
pub trait IncidentReporter: Send + Sync {
    async fn report(&self, incident: &Incident);
}
