//! OpenAI Adapter
//!
//! Chat, vision, image generation and SSE streaming against the OpenAI REST
//! API. Vision requests reuse the chat endpoint with content-part messages;
//! base64 images travel as data URIs.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::RouterError;
use crate::health::{HealthMetrics, HealthSnapshot};
use crate::streaming::{TextStream, sse_text_stream};
use crate::traits::ProviderAdapter;
use crate::transport::HttpTransport;
use crate::types::{
    GeneratedImage, ImageRequest, ImageResponse, ImageSource, ProviderId, TextRequest,
    TextResponse, VisionRequest, VisionResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

pub struct OpenAiAdapter {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
    health: HealthMetrics,
}

impl OpenAiAdapter {
    pub fn new(api_key: String, base_url: Option<String>, transport: HttpTransport) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport,
            health: HealthMetrics::new(),
        }
    }

    fn note_failure(&self, err: RouterError) -> RouterError {
        self.health.record_error();
        err
    }

    fn chat_body(request: &TextRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| json!({"role": msg.role, "content": msg.content}))
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL),
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn vision_body(request: &VisionRequest) -> Value {
        let image_url = match &request.image {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Base64 { data, media_type } => {
                format!("data:{media_type};base64,{data}")
            }
        };

        json!({
            "model": request.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL),
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": request.prompt},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ],
            }],
        })
    }

    fn image_body(request: &ImageRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL),
            "prompt": request.prompt,
            "n": request.count.unwrap_or(1),
        });
        if let Some(size) = &request.size {
            body["size"] = json!(size);
        }
        body
    }

    fn parse_completion(value: &Value) -> Result<(String, String), RouterError> {
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                RouterError::Json("openai response missing choices[0].message.content".into())
            })?
            .to_string();
        let model = value["model"].as_str().unwrap_or(DEFAULT_CHAT_MODEL).to_string();
        Ok((text, model))
    }

    fn stream_delta(value: &Value) -> Option<String> {
        value["choices"][0]["delta"]["content"]
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn chat(&self, request: TextRequest) -> Result<TextResponse, RouterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::chat_body(&request, false);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;

        let (text, model) =
            Self::parse_completion(&value).map_err(|err| self.note_failure(err))?;
        Ok(TextResponse {
            text,
            model,
            provider: self.id(),
        })
    }

    async fn vision(&self, request: VisionRequest) -> Result<VisionResponse, RouterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::vision_body(&request);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;

        let (text, model) =
            Self::parse_completion(&value).map_err(|err| self.note_failure(err))?;
        Ok(VisionResponse {
            text,
            model,
            provider: self.id(),
        })
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, RouterError> {
        let url = format!("{}/images/generations", self.base_url);
        let body = Self::image_body(&request);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;

        let images = value["data"]
            .as_array()
            .ok_or_else(|| {
                self.note_failure(RouterError::Json("openai image response missing data".into()))
            })?
            .iter()
            .map(|entry| GeneratedImage {
                url: entry["url"].as_str().map(str::to_string),
                b64_json: entry["b64_json"].as_str().map(str::to_string),
            })
            .collect();

        Ok(ImageResponse {
            images,
            provider: self.id(),
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream_chat(&self, request: TextRequest) -> Result<TextStream, RouterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::chat_body(&request, true);
        let response = self
            .transport
            .execute(&self.health, |client| {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
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
