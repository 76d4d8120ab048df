use serde::Deserialize;
use serde_json::Value;

/// Shown in place of a reply that carried no text.
pub const NO_RESPONSE: &str = "No response received.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
    /// Set on reasoning summaries from thinking models; not part of the reply.
    #[serde(default)]
    pub thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, or `None` if it produced none.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }

    /// Reply text with a placeholder when the model returned nothing.
    pub fn reply_text(&self) -> String {
        self.text()
            .unwrap_or_else(|| no_response_message(self.block_reason()))
    }
}

pub fn no_response_message(block_reason: Option<&str>) -> String {
    match block_reason {
        Some(reason) => format!("No response received (blocked: {reason})."),
        None => NO_RESPONSE.to_string(),
    }
}

/// Error body returned by the API, both for failed requests and inside streams.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl ApiError {
    pub fn reports_invalid_key(&self) -> bool {
        let by_reason = self
            .details
            .iter()
            .filter_map(|detail| detail.get("reason").and_then(Value::as_str))
            .any(|reason| matches!(reason, "API_KEY_INVALID" | "API_KEY_EXPIRED"));
        let message = self.message.to_lowercase();
        by_reason || message.contains("api key not valid") || message.contains("api key expired")
    }
}

/// One `data:` payload of a `streamGenerateContent?alt=sse` response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StreamPayload {
    Error(ErrorResponse),
    Chunk(GenerateContentResponse),
}
