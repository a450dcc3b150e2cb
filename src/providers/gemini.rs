//! Gemini Adapter
//!
//! Chat, vision and SSE streaming against the Generative Language API.
//! The API key travels as a query parameter; vision images must be inline
//! base64 (`inline_data` parts).

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiAdapter {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
    health: HealthMetrics,
}

impl GeminiAdapter {
    pub fn new(api_key: String, base_url: Option<String>, transport: HttpTransport) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport,
            health: HealthMetrics::new(),
        }
    }

    fn endpoint(&self, model: &str, action: &str, sse: bool) -> String {
        let key = urlencoding::encode(&self.api_key);
        let alt = if sse { "alt=sse&" } else { "" };
        format!(
            "{}/models/{}:{}?{}key={}",
            self.base_url,
            urlencoding::encode(model),
            action,
            alt,
            key
        )
    }

    fn note_failure(&self, err: RouterError) -> RouterError {
        self.health.record_error();
        err
    }

    /// Gemini has no system role inside `contents`; system messages map to
    /// `systemInstruction`.
    fn chat_body(request: &TextRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|msg| msg.role == MessageRole::System)
            .map(|msg| msg.content.as_str())
            .collect();

        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|msg| msg.role != MessageRole::System)
            .map(|msg| {
                let role = match msg.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": msg.content}]})
            })
            .collect();

        let mut body = json!({"contents": contents});
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n")}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        body
    }

    fn vision_body(request: &VisionRequest) -> Result<Value, RouterError> {
        let image_part = match &request.image {
            ImageSource::Base64 { data, media_type } => json!({
                "inline_data": {"mime_type": media_type, "data": data},
            }),
            ImageSource::Url(_) => {
                return Err(RouterError::InvalidRequest(
                    "gemini vision requires inline base64 image data".into(),
                ));
            }
        };

        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": request.prompt},
                    image_part,
                ],
            }],
        }))
    }

    fn parse_candidates(value: &Value) -> Result<String, RouterError> {
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                RouterError::Json("gemini response missing candidate content parts".into())
            })?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(RouterError::Json(
                "gemini response contained no text parts".into(),
            ));
        }
        Ok(text)
    }

    fn stream_delta(value: &Value) -> Option<String> {
        let parts = value["candidates"][0]["content"]["parts"].as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn chat(&self, request: TextRequest) -> Result<TextResponse, RouterError> {
        let model = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = self.endpoint(&model, "generateContent", false);
        let body = Self::chat_body(&request);
        let value = self
            .transport
            .execute_json(&self.health, |client| client.post(&url).json(&body))
            .await?;

        let text = Self::parse_candidates(&value).map_err(|err| self.note_failure(err))?;
        Ok(TextResponse {
            text,
            model,
            provider: self.id(),
        })
    }

    async fn vision(&self, request: VisionRequest) -> Result<VisionResponse, RouterError> {
        let model = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = self.endpoint(&model, "generateContent", false);
        let body = Self::vision_body(&request)?;
        let value = self
            .transport
            .execute_json(&self.health, |client| client.post(&url).json(&body))
            .await?;

        let text = Self::parse_candidates(&value).map_err(|err| self.note_failure(err))?;
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
        let model = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = self.endpoint(&model, "streamGenerateContent", true);
        let body = Self::chat_body(&request);
        let response = self
            .transport
            .execute(&self.health, |client| client.post(&url).json(&body))
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
    fn endpoint_embeds_encoded_key() {
        let adapter = GeminiAdapter::new(
            "key with space".into(),
            None,
            HttpTransport::default(),
        );
        let url = adapter.endpoint(DEFAULT_MODEL, "generateContent", false);
        assert!(url.starts_with(DEFAULT_BASE_URL));
        assert!(url.contains(":generateContent?key=key%20with%20space"));

        let sse_url = adapter.endpoint(DEFAULT_MODEL, "streamGenerateContent", true);
        assert!(sse_url.contains("alt=sse&key="));
    }

    #[test]
    fn chat_body_maps_roles_and_system_instruction() {
        let request = TextRequest {
            messages: vec![
                ChatMessage::system("short answers"),
                ChatMessage::user("ping"),
                ChatMessage::assistant("pong"),
            ],
            model: None,
            temperature: Some(0.5),
            max_tokens: Some(100),
        };
        let body = GeminiAdapter::chat_body(&request);

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "short answers"
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
    }

    #[test]
    fn vision_body_rejects_url_images() {
        let request = VisionRequest {
            prompt: "describe".into(),
            image: ImageSource::Url("https://example.com/a.png".into()),
            model: None,
        };
        let err = GeminiAdapter::vision_body(&request).unwrap_err();
        assert!(matches!(err, RouterError::InvalidRequest(_)));

        let inline = VisionRequest {
            prompt: "describe".into(),
            image: ImageSource::Base64 {
                data: "AAAA".into(),
                media_type: "image/jpeg".into(),
            },
            model: None,
        };
        let body = GeminiAdapter::vision_body(&inline).unwrap();
        assert_eq!(
            body["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
    }

    #[test]
    fn parse_candidates_joins_text_parts() {
        let value = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}],
        });
        assert_eq!(GeminiAdapter::parse_candidates(&value).unwrap(), "ab");

        let empty = serde_json::json!({"candidates": []});
        assert!(GeminiAdapter::parse_candidates(&empty).is_err());
    }
}
