use std::borrow::Cow;

use crate::providers::{Message as LLMMessage, Role};
use serde::Serialize;

/// Body of `models/{model}:generateContent` and `:streamGenerateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl<'a> GenerateContentRequest<'a> {
    pub fn new(messages: &'a [LLMMessage]) -> Self {
        Self {
            contents: messages.iter().map(Content::from).collect(),
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Blank instructions are left out of the request.
    pub fn with_system_instruction(mut self, instruction: Option<&'a str>) -> Self {
        self.system_instruction = instruction
            .filter(|text| !text.trim().is_empty())
            .map(|text| Content::text(None, text));
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = (!config.is_empty()).then_some(config);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    pub fn text(role: Option<Role>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: Cow::Borrowed(text),
            }],
        }
    }
}

impl<'a> From<&'a LLMMessage> for Content<'a> {
    fn from(message: &'a LLMMessage) -> Self {
        Self::text(Some(message.role), &message.text)
    }
}

#[derive(Debug, Serialize)]
pub struct Part<'a> {
    pub text: Cow<'a, str>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.max_output_tokens.is_none()
    }
}
