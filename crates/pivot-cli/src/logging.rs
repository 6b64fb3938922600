//! Logging and tracing setup for the pivot binary
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! An optional JSON layer writes daily rolling files for later inspection.
//! `RUST_LOG` takes precedence over the configured filter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// `[logging]` section of the cluster file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Write JSON logs to daily rolling files
    pub json_file: bool,

    /// Directory for JSON logs, defaults to the platform data dir
    pub directory: Option<PathBuf>,

    /// Include file and line in console output
    pub include_location: bool,

    /// Log span open/close with timings
    pub spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,pivot_cli=info,pivot_failover=info,pivot_connection=info".to_string(),
            json_file: false,
            directory: None,
            include_location: false,
            spans: false,
        }
    }
}

impl LoggingConfig {
    /// Raise every pivot crate to `debug` (or `trace` past one level)
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let level = match verbose {
            0 => return self,
            1 => "debug",
            _ => "trace",
        };
        self.filter = format!(
            "warn,pivot_cli={level},pivot_failover={level},pivot_connection={level},pivot_driver_postgres={level}"
        );
        self
    }

    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(log_directory)
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// keeps it alive until exit.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    // NEW fires once when the span is created; ENTER would fire on every async
    // re-poll.
    let span_events = if config.spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    layers.push(
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_writer(std::io::stderr)
            .with_filter(env_filter.clone())
            .boxed(),
    );

    let mut guard = None;
    if config.json_file {
        let log_dir = config.log_dir();
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "pivot.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(non_blocking)
                .with_filter(env_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        json_enabled = config.json_file,
        log_dir = %config.log_dir().display(),
        "logging initialized"
    );
    Ok(guard)
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pivot")
        .join("logs")
}
