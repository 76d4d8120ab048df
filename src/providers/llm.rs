use crate::core::{ApiKey, ChatError, Config};
use crate::providers::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Reply text arriving piece by piece.
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send + 'static>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send the conversation so far and return the model's reply text.
    /// The last message is the prompt being answered.
    async fn send(&self, messages: &[Message]) -> Result<String, ChatError>;

    /// Like [`ChatClient::send`], but yields the reply as it is generated.
    ///
    /// Clients without a streaming endpoint get a single-chunk stream.
    async fn send_streaming(&self, messages: &[Message]) -> Result<BoxStream, ChatError> {
        let reply = self.send(messages).await?;
        Ok(futures::stream::once(async move { Ok(reply) }).boxed())
    }
}

/// Opens a client handle for a validated API key.
pub trait Connector {
    fn connect(&self, api_key: &ApiKey, config: &Config) -> Result<Box<dyn ChatClient>, ChatError>;
}
