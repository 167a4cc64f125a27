//! Logging built on tracing + tracing-subscriber
//!
//! Log records always go to stderr; stdout is reserved for spoken lines and
//! command output. An optional rolling copy is written through
//! tracing-appender. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::Path;

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Keeps the file writer flushing; hold it until the process exits
pub struct LogGuards {
    _file_guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_settings(settings: &LoggingSettings) -> Self {
        if settings.json_format {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Initialize logging for `narrator run`
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = effective_level(settings, verbose, quiet);
    let format = LogFormat::from_settings(settings);

    let (file_layer, file_guard) = match settings.file.as_deref() {
        Some(path) => {
            let (writer, guard) = rolling_writer(path, settings.max_file_size_mb, settings.max_files)?;
            (Some(output_layer(format, writer, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(output_layer(format, std::io::stderr, true))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(
        level = %level,
        file = ?settings.file,
        json = settings.json_format,
        "Logging initialized"
    );

    Ok(LogGuards {
        _file_guard: file_guard,
    })
}

/// Stderr-only logging for short commands
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(output_layer(LogFormat::Compact, std::io::stderr, true))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// `-q` wins over `-v`; `-v` and `-vv` win over the configured level
fn effective_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => parse_level(&settings.level),
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn env_filter(level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    // The HTTP stack is chatty at debug
    let directives = [format!("narrator={}", level), "hyper=warn".into(), "reqwest=warn".into()];
    for directive in directives {
        let parsed = directive
            .parse::<Directive>()
            .map_err(|e| Error::Config(format!("Invalid log directive '{}': {}", directive, e)))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

fn output_layer<S, W>(format: LogFormat, writer: W, terminal: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(terminal && format == LogFormat::Compact);

    match (format, terminal) {
        (LogFormat::Json, _) => Box::new(base.json().with_span_events(FmtSpan::CLOSE)),
        (LogFormat::Compact, true) => Box::new(base.compact()),
        (LogFormat::Compact, false) => Box::new(base.with_file(true).with_line_number(true)),
    }
}

/// Non-blocking writer for a rolling log file next to `log_file`.
///
/// tracing-appender rotates by time only, so small size budgets rotate hourly.
fn rolling_writer(log_file: &str, max_size_mb: u64, max_files: u32) -> Result<(NonBlocking, WorkerGuard)> {
    let path = Path::new(log_file);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let prefix = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("narrator");
    let rotation = if (1..10).contains(&max_size_mb) {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Config(format!("Failed to create log file appender: {}", e)))?;

    Ok(tracing_appender::non_blocking(appender))
}
