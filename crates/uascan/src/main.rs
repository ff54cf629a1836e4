//! UA Scan launcher
//!
//! Polls the server-manager backend for servers flagged for scanning, walks
//! each server's address space and mirrors it into the backend.
//! - **Configuration**: flags with environment fallbacks, optional TOML scan settings
//! - **Graceful Shutdown**: SIGINT/SIGTERM finish the current cycle, then exit
//! - **Error Reporting**: optional JSON events for connection and gateway failures

mod reporting;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use uascan_backend::HttpBackend;
use uascan_logging::LogConfig;
use uascan_protocol::defaults::{DEFAULT_API_URL, DEFAULT_TRACES_SAMPLE_RATE};
use uascan_scanner::{ScanConfig, Scheduler, SnapshotConnector, SCAN_METRICS};

use crate::reporting::ErrorReporter;

#[derive(Parser, Debug)]
#[command(name = "uascan", version, about = "Mirror UA server address spaces into the backend")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer credential for the backend
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Error-reporting DSN (`scheme://key@host/project`); reporting is off when unset
    #[arg(long, env = "SENTRY_DSN", hide_env_values = true)]
    sentry_dsn: Option<String>,

    /// Fraction of error events to send (0.0 to 1.0)
    #[arg(long, env = "SENTRY_TRACES_SAMPLE_RATE", default_value_t = DEFAULT_TRACES_SAMPLE_RATE)]
    traces_sample_rate: f64,

    /// TOML file with scan settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to sleep between cycles (overrides the config file)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Write Prometheus counters to this file after every cycle
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Directory for rotated log files
    #[arg(long, env = "UASCAN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    uascan_logging::init_logging(LogConfig {
        app_name: "uascan",
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    })?;

    let config = load_config(&cli)?;
    let backend = HttpBackend::new(&cli.api_url, cli.access_token.clone())
        .context("Invalid backend configuration")?
        .with_retry(config.retry.clone());
    info!(
        api_url = %backend.base_url(),
        interval_secs = config.update_interval_secs,
        max_concurrent_servers = config.max_concurrent_servers,
        "Starting UA scanner"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&shutdown)?;

    let mut scheduler = Scheduler::new(Arc::new(backend), Arc::new(SnapshotConnector), config)
        .with_shutdown(shutdown);
    if let Some(dsn) = cli.sentry_dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
        let reporter = ErrorReporter::new(dsn, cli.traces_sample_rate)?;
        scheduler = scheduler.with_reporter(Arc::new(reporter));
        info!(sample_rate = cli.traces_sample_rate, "Error reporting enabled");
    }

    if cli.once {
        match scheduler.run_once().await {
            Some(report) => {
                info!(
                    servers = report.servers,
                    completed = report.completed,
                    connection_failures = report.connection_failures,
                    aborted = report.aborted,
                    "Single cycle finished"
                );
                if let Some(path) = &cli.metrics_file {
                    write_metrics(path);
                }
            }
            None => info!("Shutdown requested before the backend became available"),
        }
        return Ok(());
    }

    if let Some(path) = cli.metrics_file.clone() {
        scheduler = scheduler.with_cycle_callback(move |_| write_metrics(&path));
    }
    scheduler.run().await;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if let Some(interval) = cli.interval {
        config.update_interval_secs = interval;
    }
    config.validate().context("Invalid scan settings")?;
    Ok(config)
}

fn write_metrics(path: &Path) {
    if let Err(e) = std::fs::write(path, SCAN_METRICS.prometheus_format()) {
        warn!(path = %path.display(), error = %e, "Failed to write metrics");
    }
}

fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let flag = Arc::clone(shutdown);
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, finishing current cycle...", sig);
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    #[cfg(windows)]
    {
        let flag = Arc::clone(shutdown);
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, finishing current cycle...");
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
