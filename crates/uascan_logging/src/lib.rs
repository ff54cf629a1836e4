//! Shared logging setup for UA Scan binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "uascan=info,uascan_scanner=info,uascan_backend=info";
const VERBOSE_LOG_FILTER: &str = "uascan=debug,uascan_scanner=debug,uascan_backend=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a UA Scan process.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Lower the default filter to debug (ignored when `RUST_LOG` is set)
    pub verbose: bool,
    /// Also write size-rotated log files into this directory
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with stderr output and an optional rotating file writer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_layer = match config.log_dir.as_deref() {
        Some(dir) => {
            let writer = RotatingWriter::open(dir, config.app_name)
                .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(build_filter(config.verbose)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(build_filter(config.verbose)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    })
}

/// Size-bounded log file: `<name>.log`, rotated into `<name>.log.1` .. `<name>.log.N`.
struct RotatingFile {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    fn open(dir: &Path, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut rotating = Self {
            dir: dir.to_path_buf(),
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            written: 0,
        };
        rotating.reopen()?;
        if rotating.written > rotating.max_size {
            rotating.rotate()?;
        }
        Ok(rotating)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn archived_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let keep = self.max_files.saturating_sub(1);
        if keep > 0 {
            let oldest = self.archived_path(keep);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for idx in (1..keep).rev() {
                let src = self.archived_path(idx);
                if src.exists() {
                    fs::rename(&src, self.archived_path(idx + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(active, self.archived_path(1))?;
            }
        } else {
            // Single-file mode: truncate in place.
            File::create(self.active_path())?;
        }

        self.reopen()
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush_file(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Cloneable handle handed to `tracing_subscriber` as a `MakeWriter`.
#[derive(Clone)]
struct RotatingWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingWriter {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        Self::with_limits(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
    }

    fn with_limits(
        dir: &Path,
        app_name: &str,
        max_files: usize,
        max_size: u64,
    ) -> io::Result<Self> {
        let file = RotatingFile::open(dir, app_name, max_files, max_size)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, RotatingFile>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush_file()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("uascan"), "uascan");
        assert_eq!(sanitize_name("ua scan/1"), "ua_scan_1");
    }

    #[test]
    fn test_rotation_keeps_bounded_history() {
        let temp = TempDir::new().unwrap();
        let mut writer = RotatingWriter::with_limits(temp.path(), "uascan", 3, 16).unwrap();

        for _ in 0..10 {
            writer.write_all(b"0123456789\n").unwrap();
        }
        writer.flush().unwrap();

        assert!(temp.path().join("uascan.log").exists());
        assert!(temp.path().join("uascan.log.1").exists());
        assert!(temp.path().join("uascan.log.2").exists());
        assert!(!temp.path().join("uascan.log.3").exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let temp = TempDir::new().unwrap();
        {
            let mut writer = RotatingWriter::with_limits(temp.path(), "svc", 2, 1024).unwrap();
            writer.write_all(b"first\n").unwrap();
        }
        let mut writer = RotatingWriter::with_limits(temp.path(), "svc", 2, 1024).unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();

        let content = fs::read_to_string(temp.path().join("svc.log")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
