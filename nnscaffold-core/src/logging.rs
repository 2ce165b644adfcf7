//! Logging setup.
//!
//! Console output goes through a human-readable `tracing-subscriber` layer.
//! A second layer writes into [`RunLogFile`], a writer that the run driver
//! points at `<run_dir>/run.log` when a run starts and closes at clean-up, so
//! each run keeps its own log while the subscriber stays installed once.
//! The console filter sits behind a reload handle so every run can apply its
//! own `logger_console_level`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing::{Metadata, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, reload};

use crate::error::CoreError;

/// File name of the per-run log.
pub const RUN_LOG_FILE: &str = "run.log";

/// Crates whose events reach the console and the run log at the configured level.
const OWN_TARGETS: &str = "nnscaffold";

struct OpenRunLog {
    appender: RollingFileAppender,
    level: LevelFilter,
    path: PathBuf,
}

/// Reload handle of the console filter installed by [`init_logging`].
pub type ConsoleFilterHandle = reload::Handle<EnvFilter, Registry>;

/// Switchable run-log destination shared with the tracing subscriber.
///
/// Also carries the console filter handle when the subscriber was installed
/// with one.
#[derive(Clone, Default)]
pub struct RunLogFile {
    inner: Arc<Mutex<Option<OpenRunLog>>>,
    console: Option<ConsoleFilterHandle>,
}

impl RunLogFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_console_handle(mut self, handle: ConsoleFilterHandle) -> Self {
        self.console = Some(handle);
        self
    }

    /// Apply `level` to the console output. Without a console handle (no
    /// subscriber installed, or `RUST_LOG` in charge) this does nothing.
    pub fn set_console_level(&self, level: LevelFilter) -> Result<(), CoreError> {
        let Some(handle) = &self.console else {
            return Ok(());
        };
        handle
            .reload(console_filter(level))
            .map_err(|e| CoreError::Logging {
                message: e.to_string(),
            })
    }

    /// Start writing events at or above `level` to `<dir>/run.log`.
    ///
    /// A previously opened file is closed first.
    pub fn open(&self, dir: &Path, level: LevelFilter) -> io::Result<PathBuf> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix("run")
            .filename_suffix("log")
            .build(dir)
            .map_err(io::Error::other)?;
        let path = dir.join(RUN_LOG_FILE);

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("run log lock poisoned"))?;
        if let Some(mut previous) = guard.take() {
            previous.appender.flush()?;
        }
        *guard = Some(OpenRunLog {
            appender,
            level,
            path: path.clone(),
        });
        Ok(path)
    }

    /// Flush and stop writing to the current run log, if any.
    pub fn close(&self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("run log lock poisoned"))?;
        if let Some(mut log) = guard.take() {
            log.appender.flush()?;
        }
        Ok(())
    }

    /// Path of the open run log.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|log| log.path.clone()))
    }

    pub fn is_open(&self) -> bool {
        self.path().is_some()
    }

    fn accepts(&self, metadata: &Metadata<'_>) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|log| *metadata.level() <= log.level))
            .unwrap_or(false)
    }
}

/// Writer handed out per event by [`RunLogFile`].
pub struct RunLogWriter {
    target: Option<Arc<Mutex<Option<OpenRunLog>>>>,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(target) = &self.target else {
            return Ok(buf.len());
        };
        match target.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(log) => log.appender.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        match target.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(log) => log.appender.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLogFile {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            target: Some(self.inner.clone()),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        if self.accepts(meta) {
            self.make_writer()
        } else {
            RunLogWriter { target: None }
        }
    }
}

fn console_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::new(format!("warn,{OWN_TARGETS}={level}"))
}

/// Layer writing events into `run_log`, at the level given when it was opened.
pub fn run_log_layer<S>(run_log: &RunLogFile) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(run_log.clone())
        .with_filter(EnvFilter::new(format!("warn,{OWN_TARGETS}=trace")))
}

/// Install the global subscriber: console at `console_level` (or `RUST_LOG`
/// when set) plus the switchable run log. Returns the run-log handle.
pub fn init_logging(console_level: LevelFilter) -> Result<RunLogFile, CoreError> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let console_from_env = env_filter.is_some();
    let (filter, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| console_filter(console_level)));
    let run_log = if console_from_env {
        RunLogFile::new()
    } else {
        RunLogFile::new().with_console_handle(handle)
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(run_log_layer(&run_log))
        .try_init()
        .map_err(|e| CoreError::Logging {
            message: e.to_string(),
        })?;

    Ok(run_log)
}
