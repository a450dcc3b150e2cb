//! Anthropic Adapter
//!
//! Chat, vision and SSE streaming against the Messages API. System messages
//! are lifted into the top-level `system` field; vision prompts become
//! image + text content blocks.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::RouterError;
use crate::health::{HealthMetrics, HealthSnapshot};
use crate::streaming::{TextStream, sse_text_stream};
use crate::traits::ProviderAdapter;
use crate::transport::HttpTransport;
use crate::types::{
    ImageSource, MessageRole, ProviderId, TextRequest, TextResponse, VisionRequest,
    VisionResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
    health: HealthMetrics,
}

impl AnthropicAdapter {
    pub fn new(api_key: String, base_url: Option<String>, transport: HttpTransport) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport,
            health: HealthMetrics::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn note_failure(&self, err: RouterError) -> RouterError {
        self.health.record_error();
        err
    }

    /// The Messages API takes system prompts out-of-band and requires
    /// `max_tokens`.
    fn chat_body(request: &TextRequest, stream: bool) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|msg| msg.role == MessageRole::System)
            .map(|msg| msg.content.as_str())
            .collect();

        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|msg| msg.role != MessageRole::System)
            .map(|msg| {
                let role = match msg.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                };
                json!({"role": role, "content": msg.content})
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n"));
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn vision_body(request: &VisionRequest) -> Value {
        let image_block = match &request.image {
            ImageSource::Url(url) => json!({
                "type": "image",
                "source": {"type": "url", "url": url},
            }),
            ImageSource::Base64 { data, media_type } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            }),
        };

        json!({
            "model": request.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    image_block,
                    {"type": "text", "text": request.prompt},
                ],
            }],
        })
    }

    fn parse_message(value: &Value) -> Result<(String, String), RouterError> {
        let text = value["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find_map(|block| block["text"].as_str())
            })
            .ok_or_else(|| {
                RouterError::Json("anthropic response missing text content block".into())
            })?
            .to_string();
        let model = value["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string();
        Ok((text, model))
    }

    fn stream_delta(value: &Value) -> Option<String> {
        if value["type"] != "content_block_delta" {
            return None;
        }
        value["delta"]["text"].as_str().map(str::to_string)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn chat(&self, request: TextRequest) -> Result<TextResponse, RouterError> {
        let url = self.messages_url();
        let body = Self::chat_body(&request, false);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(&body)
            })
            .await?;

        let (text, model) = Self::parse_message(&value).map_err(|err| self.note_failure(err))?;
        Ok(TextResponse {
            text,
            model,
            provider: self.id(),
        })
    }

    async fn vision(&self, request: VisionRequest) -> Result<VisionResponse, RouterError> {
        let url = self.messages_url();
        let body = Self::vision_body(&request);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(&body)
            })
            .await?;

        let (text, model) = Self::parse_message(&value).map_err(|err| self.note_failure(err))?;
        Ok(VisionResponse {
            text,
            model,
            provider: self.id(),
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream_chat(&self, request: TextRequest) -> Result<TextStream, RouterError> {
        let url = self.messages_url();
        let body = Self::chat_body(&request, true);
        let response = self
            .transport
            .execute(&self.health, |client| {
                client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(&body)
            })
            .await?;

        Ok(sse_text_stream(response, Self::stream_delta))
    }

    fn health(&self) -> HealthSnapshot {
        self.health.snapshot(self.id())
    }

    fn reset_health(&self) {
        self.health.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn chat_body_lifts_system_messages() {
        let request = TextRequest {
            messages: vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi"),
            ],
            model: None,
            temperature: None,
            max_tokens: Some(256),
        };
        let body = AnthropicAdapter::chat_body(&request, false);

        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 256);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn chat_body_defaults_max_tokens() {
        let body = AnthropicAdapter::chat_body(&TextRequest::from_prompt("hi"), true);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn vision_body_builds_image_block() {
        let request = VisionRequest {
            prompt: "what is this".into(),
            image: ImageSource::Url("https://example.com/cat.png".into()),
            model: None,
        };
        let body = AnthropicAdapter::vision_body(&request);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["source"]["type"], "url");
        assert_eq!(content[1]["text"], "what is this");
    }

    #[test]
    fn parse_message_reads_first_text_block() {
        let value = serde_json::json!({
            "model": "claude-3-5-haiku-latest",
            "content": [{"type": "text", "text": "pong"}],
        });
        let (text, model) = AnthropicAdapter::parse_message(&value).unwrap();
        assert_eq!(text, "pong");
        assert_eq!(model, DEFAULT_MODEL);
    }

    #[test]
    fn stream_delta_only_reads_content_block_deltas() {
        let delta = serde_json::json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "chunk"},
        });
        assert_eq!(AnthropicAdapter::stream_delta(&delta), Some("chunk".into()));

        let stop = serde_json::json!({"type": "message_stop"});
        assert_eq!(AnthropicAdapter::stream_delta(&stop), None);
    }
}
