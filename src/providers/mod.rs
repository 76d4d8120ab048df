pub mod gemini;
pub mod llm;
pub mod types;

pub use gemini::types::NO_RESPONSE;
pub use gemini::{GeminiClient, GeminiConnector};
pub use llm::{BoxStream, ChatClient, Connector};
pub use types::messages::{Message, Role};
