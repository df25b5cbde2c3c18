//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Route formatted events into a [`WriteSync`] destination
//! - Hand back a guard that flushes buffered output on shutdown
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON to a rotating file for production, plain text to stdout in debug mode
//! - Log level configurable via config and `RUST_LOG`

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError, EnvFilter,
};

use crate::config::LoggerConfig;
use crate::observability::rotate::RotatingFile;
use crate::observability::sink::{buffer, CloseHandle, SharedSink, StdoutSink, WriteSync};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("global subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Adapts a [`SharedSink`] to the writer interfaces `tracing-subscriber` expects.
#[derive(Clone)]
pub struct LogSink(SharedSink);

impl LogSink {
    /// Create a writer over `sink`.
    pub fn new(sink: SharedSink) -> Self {
        Self(sink)
    }
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Durability is driven by the sink's own timer and the guard.
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Keeps the log destination alive and flushes it on close.
///
/// Dropping the guard without calling [`LogGuard::close`] still writes out
/// whatever is buffered.
#[must_use = "dropping the guard flushes and stops buffered logging"]
pub struct LogGuard {
    sink: SharedSink,
    closers: Vec<CloseHandle>,
}

impl LogGuard {
    /// Sync the destination without tearing anything down.
    pub fn flush(&self) -> io::Result<()> {
        self.sink.sync()
    }

    /// Stop background flushing and write out everything still buffered.
    pub fn close(mut self) -> io::Result<()> {
        self.close_all()
    }

    fn close_all(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for closer in self.closers.drain(..) {
            if let Err(e) = closer.close() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        // Nowhere left to report a failure.
        let _ = self.close_all();
    }
}

/// Build the destination described by `config`, wrapped in a guard that owns its teardown.
pub fn build_sink(config: &LoggerConfig) -> io::Result<LogGuard> {
    let dest: SharedSink = if config.debug {
        Arc::new(StdoutSink)
    } else {
        Arc::new(RotatingFile::open(
            config.filename(),
            config.max_size_mb,
            config.max_age_days,
            config.max_backup,
        )?)
    };

    if !config.async_write {
        return Ok(LogGuard {
            sink: dest,
            closers: Vec::new(),
        });
    }

    let (sink, close) = buffer(dest, config.buffer_size, config.flush_interval());
    Ok(LogGuard {
        sink,
        closers: vec![close],
    })
}

/// Install the global tracing subscriber.
pub fn init(config: &LoggerConfig) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let guard = build_sink(config)?;
    let writer = LogSink::new(Arc::clone(&guard.sink));

    let registry = tracing_subscriber::registry().with(filter);
    if config.debug {
        registry.with(fmt::layer().with_writer(writer)).try_init()?;
    } else {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(writer))
            .try_init()?;
    }

    tracing::info!(
        file = %config.filename().display(),
        level = %config.level,
        buffered = config.async_write,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn file_config(dir: &std::path::Path, async_write: bool) -> LoggerConfig {
        LoggerConfig {
            dir: dir.display().to_string(),
            name: "test.log".into(),
            async_write,
            ..LoggerConfig::default()
        }
    }

    #[test]
    fn test_buffered_sink_reaches_file_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), true);
        let guard = build_sink(&config).unwrap();

        let mut writer = LogSink::new(Arc::clone(&guard.sink));
        writer.write_all(b"{\"msg\":\"hello\"}\n").unwrap();
        assert_eq!(fs::read_to_string(config.filename()).unwrap(), "");

        guard.close().unwrap();
        assert_eq!(
            fs::read_to_string(config.filename()).unwrap(),
            "{\"msg\":\"hello\"}\n"
        );
    }

    #[test]
    fn test_dropped_guard_flushes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), true);
        let guard = build_sink(&config).unwrap();

        let mut writer = LogSink::new(Arc::clone(&guard.sink));
        writer.write_all(b"{\"msg\":\"startup failed\"}\n").unwrap();
        drop(guard);

        assert_eq!(
            fs::read_to_string(config.filename()).unwrap(),
            "{\"msg\":\"startup failed\"}\n"
        );
    }

    #[test]
    fn test_unbuffered_sink_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), false);
        let guard = build_sink(&config).unwrap();

        guard.sink.write_all(b"line\n").unwrap();
        assert_eq!(fs::read_to_string(config.filename()).unwrap(), "line\n");
        guard.close().unwrap();
    }
}
