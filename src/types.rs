//! Core Data Type Definitions
//!
//! Provider identifiers, the capability vocabulary, and the per-capability
//! request/response DTOs. All DTOs are plain immutable value objects with no
//! identity beyond their contents.

use serde::{Deserialize, Serialize};

/// Discrete kind of AI operation a provider may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Vision,
    ImageGen,
    Search,
    Audio,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::ImageGen => "image_gen",
            Self::Search => "search",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
}

impl ProviderId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Perplexity => "perplexity",
        }
    }

    /// Capabilities a provider kind declares. Process-wide static data, not
    /// derived at runtime.
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::OpenAi => &[
                Capability::Text,
                Capability::Vision,
                Capability::ImageGen,
                Capability::Audio,
            ],
            Self::Anthropic => &[Capability::Text, Capability::Vision],
            Self::Gemini => &[Capability::Text, Capability::Vision],
            Self::Perplexity => &[Capability::Text, Capability::Search],
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the adapter's default model when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl TextRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Self::default()
        }
    }
}

/// Chat completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    pub model: String,
    pub provider: ProviderId,
}

/// Image payload for vision requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Publicly reachable image URL.
    Url(String),
    /// Inline base64 data with its media type (e.g. `image/png`).
    Base64 { data: String, media_type: String },
}

/// Vision (image understanding) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRequest {
    pub prompt: String,
    pub image: ImageSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Vision response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionResponse {
    pub text: String,
    pub model: String,
    pub provider: ProviderId,
}

/// Image generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// Provider-interpreted size string, e.g. `"1024x1024"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One generated image, delivered by URL or inline base64.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

/// Image generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub images: Vec<GeneratedImage>,
    pub provider: ProviderId,
}

/// Web search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: ProviderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_is_static_and_closed() {
        assert!(ProviderId::OpenAi.supports(Capability::ImageGen));
        assert!(ProviderId::OpenAi.supports(Capability::Audio));
        assert!(!ProviderId::Anthropic.supports(Capability::ImageGen));
        assert!(ProviderId::Perplexity.supports(Capability::Search));
        assert!(!ProviderId::Gemini.supports(Capability::Search));
    }

    #[test]
    fn provider_id_serde_round_trip() {
        for id in [
            ProviderId::OpenAi,
            ProviderId::Anthropic,
            ProviderId::Gemini,
            ProviderId::Perplexity,
        ] {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
            let back: ProviderId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn text_request_from_prompt() {
        let req = TextRequest::from_prompt("hello");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, MessageRole::User);
        assert!(req.model.is_none());
    }
}
