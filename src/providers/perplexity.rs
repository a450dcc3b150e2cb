//! Perplexity Adapter
//!
//! OpenAI-compatible chat wire shape with grounded search on top: search
//! requests run a `sonar` completion and map the returned
//! `search_results`/`citations` into [`SearchResult`] entries.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::RouterError;
use crate::health::{HealthMetrics, HealthSnapshot};
use crate::streaming::{TextStream, sse_text_stream};
use crate::traits::ProviderAdapter;
use crate::transport::HttpTransport;
use crate::types::{
    ProviderId, SearchRequest, SearchResponse, SearchResult, TextRequest, TextResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

pub struct PerplexityAdapter {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
    health: HealthMetrics,
}

impl PerplexityAdapter {
    pub fn new(api_key: String, base_url: Option<String>, transport: HttpTransport) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport,
            health: HealthMetrics::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
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
            "model": request.model.as_deref().unwrap_or(DEFAULT_MODEL),
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

    fn search_body(request: &SearchRequest) -> Value {
        json!({
            "model": DEFAULT_MODEL,
            "messages": [{"role": "user", "content": request.query}],
        })
    }

    fn parse_completion(value: &Value) -> Result<(String, String), RouterError> {
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                RouterError::Json("perplexity response missing choices[0].message.content".into())
            })?
            .to_string();
        let model = value["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string();
        Ok((text, model))
    }

    /// Newer responses carry structured `search_results`; older ones only a
    /// flat `citations` URL list.
    fn parse_results(value: &Value, limit: Option<usize>) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> =
            if let Some(entries) = value["search_results"].as_array() {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let url = entry["url"].as_str()?.to_string();
                        Some(SearchResult {
                            title: entry["title"].as_str().unwrap_or(&url).to_string(),
                            url,
                            snippet: entry["snippet"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .collect()
            } else {
                value["citations"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|citation| {
                        let url = citation.as_str()?.to_string();
                        Some(SearchResult {
                            title: url.clone(),
                            url,
                            snippet: String::new(),
                        })
                    })
                    .collect()
            };

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }

    fn stream_delta(value: &Value) -> Option<String> {
        value["choices"][0]["delta"]["content"]
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl ProviderAdapter for PerplexityAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Perplexity
    }

    async fn chat(&self, request: TextRequest) -> Result<TextResponse, RouterError> {
        let url = self.completions_url();
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

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, RouterError> {
        let url = self.completions_url();
        let body = Self::search_body(&request);
        let value = self
            .transport
            .execute_json(&self.health, |client| {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;

        // A grounded answer with no sources is useless as a search result.
        let results = Self::parse_results(&value, request.max_results);
        if results.is_empty() {
            return Err(self.note_failure(RouterError::Json(
                "perplexity response carried no search results".into(),
            )));
        }

        Ok(SearchResponse {
            results,
            provider: self.id(),
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream_chat(&self, request: TextRequest) -> Result<TextStream, RouterError> {
        let url = self.completions_url();
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
