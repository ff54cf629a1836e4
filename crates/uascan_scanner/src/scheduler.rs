//! Scheduler
//!
//! The outer polling loop. Waits until the backend answers, then repeats
//! forever: capture one timestamp for the cycle, fetch the servers flagged for
//! scanning, reconcile them, sleep. Gateway failures never end the loop; a
//! failed listing skips the cycle and a failed pass leaves its server flagged
//! for the next one.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use uascan_backend::Backend;
use uascan_protocol::{CheckTimestamp, Server, ServerId};

use crate::client::UaConnector;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::incident::{Incident, IncidentKind, IncidentReporter};
use crate::metrics::SCAN_METRICS;
use crate::reconciler::{PassOutcome, Reconciler};

/// Longest uninterrupted sleep before the shutdown flag is checked again
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

type CycleCallback = Box<dyn Fn(&CycleReport) + Send + Sync>;

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub check_datetime: CheckTimestamp,
    pub servers: usize,
    pub completed: usize,
    pub connection_failures: usize,
    pub aborted: usize,
    pub listing_failed: bool,
}

pub struct Scheduler {
    backend: Arc<dyn Backend>,
    reconciler: Reconciler,
    config: ScanConfig,
    shutdown: Arc<AtomicBool>,
    reporter: Option<Arc<dyn IncidentReporter>>,
    on_cycle: Option<CycleCallback>,
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn Backend>,
        connector: Arc<dyn UaConnector>,
        config: ScanConfig,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&backend), connector, config.connect_timeout());
        Self {
            backend,
            reconciler,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            reporter: None,
            on_cycle: None,
        }
    }

    /// Share an externally owned shutdown flag (e.g. set by a signal handler).
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn IncidentReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Called after every cycle of [`Scheduler::run`].
    pub fn with_cycle_callback(
        mut self,
        callback: impl Fn(&CycleReport) + Send + Sync + 'static,
    ) -> Self {
        self.on_cycle = Some(Box::new(callback));
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Poll the backend until it answers. Returns false if shut down first.
    pub async fn wait_for_backend(&self) -> bool {
        loop {
            if self.backend.available().await {
                tracing::info!("Backend available");
                return true;
            }
            tracing::info!(
                retry_secs = self.config.availability_retry_secs,
                "Backend unavailable, waiting"
            );
            if !self.sleep(self.config.availability_retry()).await {
                return false;
            }
        }
    }

    /// Run cycles until shutdown.
    pub async fn run(&self) {
        if !self.wait_for_backend().await {
            tracing::info!("Shutdown before backend became available");
            return;
        }

        while !self.is_shutdown() {
            let report = self.run_cycle().await;
            tracing::info!("{}", SCAN_METRICS.snapshot().summary());
            if let Some(callback) = &self.on_cycle {
                callback(&report);
            }
            if !self.sleep(self.config.update_interval()).await {
                break;
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// Wait for the backend and run a single cycle.
    pub async fn run_once(&self) -> Option<CycleReport> {
        if !self.wait_for_backend().await {
            return None;
        }
        Some(self.run_cycle().await)
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(CheckTimestamp::now()).await
    }

    /// Run one cycle with every pass stamped `check_datetime`.
    pub async fn run_cycle_at(&self, check_datetime: CheckTimestamp) -> CycleReport {
        let mut report = CycleReport {
            check_datetime,
            ..CycleReport::default()
        };

        let servers = match self.backend.servers_due_for_scan().await {
            Ok(servers) => unique_servers(servers),
            Err(e) => {
                SCAN_METRICS.inc_gateway_errors();
                tracing::error!(error = %e, "Failed to list servers, skipping cycle");
                report.listing_failed = true;
                self.raise(IncidentKind::Gateway, None, check_datetime, e.to_string())
                    .await;
                return report;
            }
        };
        report.servers = servers.len();
        tracing::debug!(
            servers = servers.len(),
            check_datetime = %check_datetime,
            "Starting cycle"
        );

        let limit = self.config.max_concurrent_servers.max(1);
        let outcomes: Vec<(ServerId, Result<PassOutcome, ScanError>)> = stream::iter(&servers)
            .map(|server| async move {
                (
                    server.id,
                    self.reconciler.reconcile(server, check_datetime).await,
                )
            })
            .buffered(limit)
            .collect()
            .await;

        for (server_id, outcome) in outcomes {
            match outcome {
                Ok(PassOutcome::Completed(_)) => report.completed += 1,
                Ok(PassOutcome::ConnectionFailed { error }) => {
                    report.connection_failures += 1;
                    self.raise(IncidentKind::Connection, Some(server_id), check_datetime, error)
                        .await;
                }
                Err(e) => {
                    report.aborted += 1;
                    tracing::error!(server_id = %server_id, error = %e, "Server pass aborted");
                    self.raise(
                        IncidentKind::Gateway,
                        Some(server_id),
                        check_datetime,
                        e.to_string(),
                    )
                    .await;
                }
            }
        }

        SCAN_METRICS.inc_cycles_completed();
        tracing::info!(
            check_datetime = %check_datetime,
            servers = report.servers,
            completed = report.completed,
            connection_failures = report.connection_failures,
            aborted = report.aborted,
            "Cycle complete"
        );
        report
    }

    async fn raise(
        &self,
        kind: IncidentKind,
        server_id: Option<ServerId>,
        check_datetime: CheckTimestamp,
        message: String,
    ) {
        if let Some(reporter) = &self.reporter {
            let incident = Incident {
                kind,
                server_id,
                check_datetime,
                message,
            };
            reporter.report(&incident).await;
        }
    }

    /// Sleep for `duration` in slices; false if shutdown was requested.
    async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(SHUTDOWN_POLL)).await;
        }
    }
}

/// Keep the first entry per server id so no server runs two passes in one cycle.
fn unique_servers(servers: Vec<Server>) -> Vec<Server> {
    let mut seen = HashSet::new();
    servers
        .into_iter()
        .filter(|server| {
            let fresh = seen.insert(server.id);
            if !fresh {
                tracing::warn!(server_id = %server.id, "Duplicate server in listing, ignoring");
            }
            fresh
        })
        .collect()
}
