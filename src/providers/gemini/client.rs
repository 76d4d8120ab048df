use crate::core::{ApiKey, ChatError, Config};
use crate::providers::llm::{BoxStream, ChatClient, Connector};
use crate::providers::Message as LLMMessage;
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use log::debug;
use reqwest::{header::HeaderValue, Client, Response, StatusCode};
use std::fmt::Display;

use super::types::{
    no_response_message, ApiError, ErrorResponse, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, StreamPayload,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` REST API
pub struct GeminiClient {
    api_key: HeaderValue,
    client: Client,
    config: Config,
}

impl GeminiClient {
    /// Creates a new Gemini client
    ///
    /// # Arguments
    /// * `api_key` - Key sent with every request
    /// * `config` - Model, endpoint and generation settings
    ///
    /// # Errors
    /// Returns a configuration error if the key cannot be sent as a header
    pub fn new(api_key: &ApiKey, config: Config) -> Result<Self, ChatError> {
        let mut api_key = HeaderValue::from_str(api_key.expose()).map_err(|_| {
            ChatError::Configuration("API key contains invalid characters".to_string())
        })?;
        api_key.set_sensitive(true);

        Ok(Self {
            api_key,
            client: Client::new(),
            config,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{base}/models/{model}:{method}",
            base = self.config.api_base.trim_end_matches('/'),
            model = self.config.model()
        )
    }

    fn build_request<'a>(&'a self, messages: &'a [LLMMessage]) -> GenerateContentRequest<'a> {
        GenerateContentRequest::new(messages)
            .with_system_instruction(self.config.system_prompt.as_deref())
            .with_generation_config(GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            })
    }

    async fn request_generate_content(
        &self,
        url: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<Response, ChatError> {
        debug!("[Gemini] POST {url} ({} contents)", request.contents.len());

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.clone())
            .json(request)
            .send()
            .await
            .map_err(ChatError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_failure(status, &error_text))
    }
}

/// Maps a failed HTTP exchange onto transient or unrecoverable errors.
///
/// Bad credentials, missing permissions and unknown models need the user to
/// change something before another request can succeed. Everything else
/// (rate limits, server trouble, a rejected prompt) may work on the next turn.
pub fn classify_failure(status: StatusCode, body: &str) -> ChatError {
    let error = serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| ApiError {
            code: status.as_u16(),
            message: body.trim().to_string(),
            ..Default::default()
        },
        |response| response.error,
    );
    classify_api_error(status.as_u16(), &error)
}

fn classify_api_error(status: u16, error: &ApiError) -> ChatError {
    let message = if error.message.is_empty() {
        "Unknown error"
    } else {
        error.message.as_str()
    };
    let api_status = error.status.as_deref().unwrap_or_default();

    let unrecoverable = matches!(status, 401 | 403 | 404)
        || matches!(
            api_status,
            "UNAUTHENTICATED" | "PERMISSION_DENIED" | "NOT_FOUND" | "FAILED_PRECONDITION"
        )
        || error.reports_invalid_key();

    match status {
        _ if unrecoverable => ChatError::Unrecoverable(format!(
            "API request failed with status {status}: {message}"
        )),
        429 => ChatError::Transient(format!("Rate limit exceeded: {message}")),
        _ => ChatError::Transient(format!(
            "API request failed with status {status}: {message}"
        )),
    }
}

/// Turns server-sent events into reply text chunks.
fn reply_chunks<S, E>(events: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<Event, EventStreamError<E>>> + Send + 'static,
    E: Display + Send + 'static,
{
    try_stream! {
        let mut events = Box::pin(events);
        let mut received_text = false;
        let mut block_reason: Option<String> = None;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ChatError::Transient(format!("Stream interrupted: {e}")))?;
            if event.data.trim().is_empty() {
                continue;
            }

            let payload: StreamPayload = serde_json::from_str(&event.data).map_err(|e| {
                ChatError::Transient(format!("Failed to parse Gemini stream event: {e}"))
            })?;
            match payload {
                StreamPayload::Error(ErrorResponse { error }) => {
                    Err::<(), _>(classify_api_error(error.code, &error))?;
                }
                StreamPayload::Chunk(chunk) => {
                    if let Some(reason) = chunk.block_reason() {
                        block_reason = Some(reason.to_string());
                    }
                    if let Some(text) = chunk.text() {
                        received_text = true;
                        yield text;
                    }
                }
            }
        }

        if !received_text {
            yield no_response_message(block_reason.as_deref());
        }
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    async fn send(&self, messages: &[LLMMessage]) -> Result<String, ChatError> {
        let request = self.build_request(messages);
        let response = self
            .request_generate_content(&self.endpoint("generateContent"), &request)
            .await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| ChatError::Transient(format!("Failed to get response text: {e}")))?;
        let reply: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| ChatError::Transient(format!("Failed to parse Gemini response: {e}")))?;

        if let Some(usage) = &reply.usage_metadata {
            debug!("[Gemini] usage: {usage:?}");
        }
        Ok(reply.reply_text())
    }

    async fn send_streaming(&self, messages: &[LLMMessage]) -> Result<BoxStream, ChatError> {
        let request = self.build_request(messages);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.request_generate_content(&url, &request).await?;

        Ok(reply_chunks(response.bytes_stream().eventsource()).boxed())
    }
}

/// Opens [`GeminiClient`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiConnector;

impl Connector for GeminiConnector {
    fn connect(
        &self,
        api_key: &ApiKey,
        config: &Config,
    ) -> Result<Box<dyn ChatClient>, ChatError> {
        Ok(Box::new(GeminiClient::new(api_key, config.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> ChatError {
        classify_failure(StatusCode::from_u16(status).unwrap(), body)
    }

    #[test]
    fn test_auth_failures_are_unrecoverable() {
        let invalid_key = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT", "details": [{"reason": "API_KEY_INVALID"}]}}"#;
        assert!(matches!(classify(400, invalid_key), ChatError::Unrecoverable(msg) if msg.contains("API key not valid")));

        let denied = r#"{"error": {"code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED"}}"#;
        assert!(classify(403, denied).is_unrecoverable());
        assert!(classify(401, "").is_unrecoverable());
        assert!(classify(404, "models/nope is not found").is_unrecoverable());

        let region = r#"{"error": {"code": 400, "message": "User location is not supported for the API use.", "status": "FAILED_PRECONDITION"}}"#;
        assert!(classify(400, region).is_unrecoverable());
    }

    #[test]
    fn test_other_failures_are_transient() {
        let quota = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(classify(429, quota), ChatError::Transient(msg) if msg.contains("Rate limit")));
        assert!(matches!(classify(500, "Internal error"), ChatError::Transient(_)));
        assert!(matches!(classify(503, ""), ChatError::Transient(msg) if msg.contains("Unknown error")));

        let bad_request = r#"{"error": {"code": 400, "message": "Invalid JSON payload received.", "status": "INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify(400, bad_request), ChatError::Transient(_)));
    }

    #[test]
    fn test_endpoint() {
        let mut config = Config::default();
        config.api_base = "http://localhost:8080/v1beta/".to_string();
        config.update_model("models/gemini-2.0-flash");
        let client = GeminiClient::new(&ApiKey::new("key").unwrap(), config).unwrap();

        assert_eq!(
            client.endpoint("generateContent"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_connect_rejects_unusable_key() {
        let key = ApiKey::new("bad\nkey").unwrap();
        let result = GeminiConnector.connect(&key, &Config::default());
        assert!(matches!(result, Err(ChatError::Configuration(_))));
    }
}
