//! Logging setup shared by pkbroker binaries.
//!
//! Every event goes to a size-rotated file under `$PKBROKER_HOME/logs`.
//! stderr gets warnings only, or the file filter with `verbose`, since
//! stdout carries the event stream. `RUST_LOG` overrides the default filter.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "pkbroker=info,pkbroker_job=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for one binary.
pub struct LogConfig<'a> {
    /// Base name of the log file.
    pub app_name: &'a str,
    /// Mirror the file filter on stderr.
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let appender =
        RollingFileAppender::new(log_dir, config.app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    // worker threads and the dispatch thread share one appender
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(appender))
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

/// The pkbroker home directory: `$PKBROKER_HOME` or `~/.pkbroker`.
pub fn pkbroker_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("PKBROKER_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".pkbroker"))
}

/// Ensure `<home>/logs` exists and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = pkbroker_home()?.join("logs");
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<name>.log` plus up to `max_files - 1` rotated `<name>.log.N` files.
struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: File,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: PathBuf, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        let current = dir.join(format!("{}.log", base_name));
        let (file, current_size) = open_append(&current)?;
        let mut appender = Self {
            dir,
            base_name: base_name.to_string(),
            max_files: max_files.max(2),
            max_size,
            file,
            current_size,
        };
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn path(&self, index: usize) -> PathBuf {
        match index {
            0 => self.dir.join(format!("{}.log", self.base_name)),
            n => self.dir.join(format!("{}.log.{}", self.base_name, n)),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        let oldest = self.path(self.max_files - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for idx in (0..self.max_files - 1).rev() {
            let src = self.path(idx);
            if src.exists() {
                fs::rename(&src, self.path(idx + 1))?;
            }
        }

        let (file, size) = open_append(&self.path(0))?;
        self.file = file;
        self.current_size = size;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let bytes = self.file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appender_rotates_when_full() {
        let tmp = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "daemon", 3, 16).unwrap();

        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"abcdefghij").unwrap();
        appender.flush().unwrap();

        let current = fs::read_to_string(tmp.path().join("daemon.log")).unwrap();
        let rotated = fs::read_to_string(tmp.path().join("daemon.log.1")).unwrap();
        assert_eq!(current, "abcdefghij");
        assert_eq!(rotated, "0123456789");
    }

    #[test]
    fn test_oldest_file_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "daemon", 2, 4).unwrap();

        appender.write_all(b"aaaa").unwrap();
        appender.write_all(b"bbbb").unwrap();
        appender.write_all(b"cccc").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("daemon.log")).unwrap(), "cccc");
        assert_eq!(fs::read_to_string(tmp.path().join("daemon.log.1")).unwrap(), "bbbb");
        assert!(!tmp.path().join("daemon.log.2").exists());
    }

    #[test]
    fn test_oversized_file_is_rotated_on_open() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("daemon.log"), b"leftover from last run").unwrap();

        let appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "daemon", 3, 8).unwrap();

        assert_eq!(appender.current_size, 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("daemon.log.1")).unwrap(),
            "leftover from last run"
        );
    }
}
