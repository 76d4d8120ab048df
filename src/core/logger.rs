//! Leveled event log for the chat session.
//!
//! A [`Logger`] is built once at startup and passed by reference to whatever
//! needs it. Every event is handed to each attached [`LogSink`] as soon as it
//! is emitted; nothing is buffered in the logger itself. Sink failures are
//! dropped so logging can never take the chat down with it.

use crate::core::ChatError;
use chrono::{DateTime, Local};
use colored::Colorize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CSV_HEADER: &str = "DATE,LEVEL,MESSAGE,ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
    Critical,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
    /// Kind of the [`ChatError`] behind the event, if any.
    pub error: Option<&'static str>,
    pub timestamp: DateTime<Local>,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            error: None,
            timestamp: Local::now(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Destination for log events.
pub trait LogSink: Send {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()>;
}

pub struct Logger {
    sinks: Mutex<Vec<Box<dyn LogSink>>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a logger without sinks. Events are discarded until one is attached.
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Logger writing every level to standard error.
    pub fn stderr() -> Self {
        Self::new().with_sink(ConsoleSink::stderr())
    }

    pub fn with_sink(self, sink: impl LogSink + 'static) -> Self {
        self.attach(sink);
        self
    }

    pub fn attach(&self, sink: impl LogSink + 'static) {
        self.lock_sinks().push(Box::new(sink));
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.emit(Level::Critical, message.as_ref(), None);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(Level::Error, message.as_ref(), None);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Level::Info, message.as_ref(), None);
    }

    /// Logs `error` at `level`, tagging the event with the error kind.
    pub fn report(&self, level: Level, error: &ChatError) {
        self.emit(level, &error.to_string(), Some(error.kind()));
    }

    fn emit(&self, level: Level, message: &str, error: Option<&'static str>) {
        let message = if message.trim().is_empty() {
            "No message provided."
        } else {
            message
        };
        let mut event = LogEvent::new(level, message);
        event.error = error;

        for sink in self.lock_sinks().iter_mut() {
            if let Err(e) = sink.write_event(&event) {
                log::debug!("[Logger] dropped {level} event: {e}");
            }
        }
    }

    // A sink that panicked mid-write leaves the list itself intact.
    fn lock_sinks(&self) -> MutexGuard<'_, Vec<Box<dyn LogSink>>> {
        self.sinks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Writes `"{timestamp} [{LEVEL}] {message}"` lines to a terminal stream.
///
/// The chat prints model replies on stdout, so the binary keeps every log
/// level on stderr.
pub struct ConsoleSink<W: Write + Send> {
    writer: W,
    colorize: bool,
}

impl ConsoleSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr(), true)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub const fn new(writer: W, colorize: bool) -> Self {
        Self { writer, colorize }
    }

    fn level_tag(&self, level: Level) -> String {
        let tag = format!("[{level}]");
        if !self.colorize {
            return tag;
        }
        match level {
            Level::Info => tag.cyan().to_string(),
            Level::Error => tag.red().to_string(),
            Level::Critical => tag.red().bold().to_string(),
        }
    }
}

impl<W: Write + Send> LogSink for ConsoleSink<W> {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} {} {}",
            event.formatted_timestamp(),
            self.level_tag(event.level),
            event.message
        )?;
        self.writer.flush()
    }
}

/// Appends `DATE,LEVEL,MESSAGE,ERROR` rows to a CSV file. `ERROR` holds the
/// error kind and is left empty for plain messages.
pub struct CsvFileSink {
    file: File,
}

impl CsvFileSink {
    /// Opens `path` for appending, creating parent directories as needed and
    /// writing the header row when the file is new or empty.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{CSV_HEADER}")?;
        }
        Ok(Self { file })
    }
}

impl LogSink for CsvFileSink {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()> {
        writeln!(
            self.file,
            "{},{},{},{}",
            event.formatted_timestamp(),
            event.level,
            csv_field(&event.message),
            event.error.unwrap_or_default()
        )
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Keeps events in memory. Clones share the same event list.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

impl LogSink for MemorySink {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()> {
        self.events
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?
            .push(event.clone());
        Ok(())
    }
}
