use anyhow::{Context, Result};
use std::{
    fmt::{self, Write as _},
    fs::{File, OpenOptions},
    path::Path,
    sync::Mutex,
    time::UNIX_EPOCH,
};
use tracing::Level;
use tracing_subscriber::{
    Layer, Registry,
    filter::Targets,
    fmt::{format::Writer, time::FormatTime, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogOptions;
use crate::event::SESSION_TARGET;

/// Timestamp format of log records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogTime {
    /// RFC 3339 with microseconds.
    Iso,
    /// Microseconds since the unix epoch.
    UnixMicros,
}

impl FormatTime for LogTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match self {
            Self::Iso => tracing_subscriber::fmt::time::SystemTime.format_time(w),
            Self::UnixMicros => {
                let micros = std::time::SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_micros())
                    .unwrap_or_default();
                write!(w, "{micros}")
            }
        }
    }
}

/// Session records are always on; lifecycle records need `verbose`.
#[must_use]
pub fn filter(verbose: bool) -> Targets {
    let targets = Targets::new().with_target(SESSION_TARGET, Level::INFO);
    if verbose {
        targets.with_default(Level::INFO)
    } else {
        targets
    }
}

pub fn open_log_file(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Installs the global subscriber described by `options`.
pub fn init(options: &LogOptions) -> Result<()> {
    let (writer, to_stdout) = match &options.output {
        Some(path) => (
            BoxMakeWriter::new(Mutex::new(open_log_file(path, options.append)?)),
            false,
        ),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };
    let timer = if options.iso_time {
        LogTime::Iso
    } else {
        LogTime::UnixMicros
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_timer(timer)
        .with_target(false)
        .with_ansi(options.console && to_stdout);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if options.console {
        layer.compact().boxed()
    } else {
        layer
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter(options.verbose)))
        .try_init()
        .context("Failed to install log subscriber")
}
