//! Tracing subscriber setup for the service binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str =
    "newsfeat_api=debug,newsfeat_jobs=debug,newsfeat_inference=info,newsfeat_db=info,tower_http=debug";

const DEFAULT_LOG_FILE_NAME: &str = "newsfeat.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Where and how log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Daily-rotated log file. Standard output when unset.
    pub file: Option<PathBuf>,
    /// Explicit ANSI colour override.
    pub ansi: Option<bool>,
}

impl LogConfig {
    /// Read `LOG_FORMAT` (`text` | `json`), `LOG_FILE` and `LOG_ANSI`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name: &str| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            format,
            file: lookup("LOG_FILE").map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
        }
    }

    /// Colours default on for the terminal and off for files.
    pub fn use_ansi(&self) -> bool {
        self.ansi.unwrap_or(self.file.is_none())
    }

    /// Directory and file name prefix for the rolling appender.
    fn file_parts(&self) -> Option<(&Path, &OsStr)> {
        let path = self.file.as_deref()?;
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .unwrap_or(OsStr::new(DEFAULT_LOG_FILE_NAME));
        Some((dir, name))
    }
}

/// Install the global subscriber.
///
/// Hold the returned guard until exit so buffered file output is flushed.
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = match config.file_parts() {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(config.use_ansi());
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(layer.json()).init(),
        LogFormat::Text => registry.with(layer).init(),
    }

    guard
}
