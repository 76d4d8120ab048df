pub mod cli;
pub mod core;
pub mod providers;

pub use crate::core::{ChatError, ChatLoop, Config, Logger, Termination};
pub use providers::{ChatClient, Connector, GeminiClient, GeminiConnector, Message, Role};
