//! Shared logging setup for KCIDB binaries.
//!
//! Logs always go to stderr. When a log directory is configured, a size-rotated
//! file copy is written as well (`<app>.log`, `<app>.log.1`, ...).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by KCIDB binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// 0 = warnings only, 1 = info, 2+ = debug.
    pub verbose: u8,
    pub log_dir: Option<PathBuf>,
}

/// Default `EnvFilter` directives for a verbosity level.
///
/// `RUST_LOG` always takes precedence over these.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "warn,kcidb_ingester=info,kcidb_store=info",
        _ => "info,kcidb_ingester=debug,kcidb_store=debug",
    }
}

fn build_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)))
}

/// Initialize tracing with stderr output and an optional rolling file writer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_layer = match config.log_dir {
        Some(dir) => {
            let writer = LogFileWriter::open(dir, config.app_name)?;
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

/// `<stem>.log` and its older generations `<stem>.log.1` .. `<stem>.log.{keep-1}`.
struct LogGenerations {
    dir: PathBuf,
    stem: String,
    keep: usize,
}

impl LogGenerations {
    /// Generation 0 is the file being written.
    fn path(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{n}", self.stem)),
        }
    }

    /// Drop the oldest generation and age every other one by one.
    fn shift(&self) -> io::Result<()> {
        ignore_missing(fs::remove_file(self.path(self.keep - 1)))?;
        for generation in (0..self.keep - 1).rev() {
            ignore_missing(fs::rename(self.path(generation), self.path(generation + 1)))?;
        }
        Ok(())
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Append-only log file that starts a new generation once `max_bytes` would
/// be exceeded. A single oversized write still lands in one file.
struct RotatingLog {
    generations: LogGenerations,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingLog {
    fn open(dir: PathBuf, app_name: &str, keep: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let generations = LogGenerations {
            dir,
            stem: sanitize_name(app_name),
            keep: keep.max(1),
        };
        let (file, written) = open_append(&generations.path(0))?;
        let mut log = Self {
            generations,
            max_bytes,
            file,
            written,
        };
        if log.written > log.max_bytes {
            log.start_generation()?;
        }
        Ok(log)
    }

    fn start_generation(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.generations.shift()?;
        let (file, written) = open_append(&self.generations.path(0))?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.start_generation()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `MakeWriter` handing out handles to one shared [`RotatingLog`].
#[derive(Clone)]
struct LogFileWriter {
    log: Arc<Mutex<RotatingLog>>,
}

impl LogFileWriter {
    fn open(dir: PathBuf, app_name: &str) -> Result<Self> {
        let log = RotatingLog::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {app_name}"))?;
        Ok(Self {
            log: Arc::new(Mutex::new(log)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatingLog> {
        // Losing the lock to a panic leaves a usable file handle behind.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// Keep file names to `[A-Za-z0-9_-]`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}
