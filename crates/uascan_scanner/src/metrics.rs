//! Scan metrics
//!
//! Process-wide counters updated by the walker, reconciler and scheduler.
//! Lock-free atomics, read through [`ScanMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics instance
pub static SCAN_METRICS: ScanMetrics = ScanMetrics::new();

pub struct ScanMetrics {
    // Cycle and pass counters
    pub cycles_completed: AtomicU64,
    pub passes_completed: AtomicU64,
    pub passes_failed: AtomicU64,
    pub passes_aborted: AtomicU64,

    // Node counters
    pub nodes_recorded: AtomicU64,
    pub virtual_nodes_recorded: AtomicU64,
    pub node_errors: AtomicU64,

    // Gateway
    pub gateway_errors: AtomicU64,

    // Timing (cumulative microseconds)
    pub pass_time_us: AtomicU64,
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMetrics {
    pub const fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            passes_completed: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            passes_aborted: AtomicU64::new(0),
            nodes_recorded: AtomicU64::new(0),
            virtual_nodes_recorded: AtomicU64::new(0),
            node_errors: AtomicU64::new(0),
            gateway_errors: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_cycles_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_passes_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Pass ended with a connection error reported to the backend
    #[inline]
    pub fn inc_passes_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Pass ended on a gateway failure, nothing reset or pruned
    #[inline]
    pub fn inc_passes_aborted(&self) {
        self.passes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_nodes_recorded(&self) {
        self.nodes_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_virtual_nodes_recorded(&self, count: u64) {
        self.virtual_nodes_recorded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_node_errors(&self) {
        self.node_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_gateway_errors(&self) {
        self.gateway_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pass_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.pass_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScanMetricsSnapshot {
        ScanMetricsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            passes_aborted: self.passes_aborted.load(Ordering::Relaxed),
            nodes_recorded: self.nodes_recorded.load(Ordering::Relaxed),
            virtual_nodes_recorded: self.virtual_nodes_recorded.load(Ordering::Relaxed),
            node_errors: self.node_errors.load(Ordering::Relaxed),
            gateway_errors: self.gateway_errors.load(Ordering::Relaxed),
            pass_time_us: self.pass_time_us.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 9] = [
            (
                "uascan_cycles_completed_total",
                "Scan cycles completed",
                s.cycles_completed,
            ),
            (
                "uascan_passes_completed_total",
                "Server passes reconciled and pruned",
                s.passes_completed,
            ),
            (
                "uascan_passes_failed_total",
                "Server passes ended by a connection error",
                s.passes_failed,
            ),
            (
                "uascan_passes_aborted_total",
                "Server passes aborted by a backend failure",
                s.passes_aborted,
            ),
            (
                "uascan_nodes_recorded_total",
                "Real nodes upserted",
                s.nodes_recorded,
            ),
            (
                "uascan_virtual_nodes_recorded_total",
                "Virtual field nodes upserted",
                s.virtual_nodes_recorded,
            ),
            (
                "uascan_node_errors_total",
                "Soft per-node read failures",
                s.node_errors,
            ),
            (
                "uascan_gateway_errors_total",
                "Backend calls that failed after retries",
                s.gateway_errors,
            ),
            (
                "uascan_pass_time_microseconds_total",
                "Cumulative pass time in microseconds",
                s.pass_time_us,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ScanMetricsSnapshot {
    pub cycles_completed: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub passes_aborted: u64,
    pub nodes_recorded: u64,
    pub virtual_nodes_recorded: u64,
    pub node_errors: u64,
    pub gateway_errors: u64,
    pub pass_time_us: u64,
}

impl ScanMetricsSnapshot {
    /// Average pass time in milliseconds over all finished passes
    pub fn avg_pass_time_ms(&self) -> f64 {
        let passes = self.passes_completed + self.passes_failed + self.passes_aborted;
        if passes == 0 {
            0.0
        } else {
            (self.pass_time_us as f64 / passes as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Cycles: {} | Passes: {} completed, {} failed, {} aborted | \
             Nodes: {} real, {} virtual, {} soft errors | \
             Gateway errors: {} | Avg pass: {:.2}ms",
            self.cycles_completed,
            self.passes_completed,
            self.passes_failed,
            self.passes_aborted,
            self.nodes_recorded,
            self.virtual_nodes_recorded,
            self.node_errors,
            self.gateway_errors,
            self.avg_pass_time_ms(),
        )
    }
}
