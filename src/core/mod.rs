pub mod chat;
mod config;
pub mod error;
pub mod logger;

pub use chat::{ChatLoop, Flow, SessionState, Termination};
pub use config::{ApiKey, Config, API_KEY_VARS, CONFIG_FILE};
pub use error::ChatError;
pub use logger::{ConsoleSink, CsvFileSink, Level, LogEvent, LogSink, Logger, MemorySink};
