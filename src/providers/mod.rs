//! Concrete Provider Adapters
//!
//! One module per upstream provider, each implementing
//! [`ProviderAdapter`](crate::traits::ProviderAdapter) over the shared
//! [`HttpTransport`](crate::transport::HttpTransport). Adapters are swappable
//! variants behind the contract; the router never inspects concrete types.

mod anthropic;
mod gemini;
mod openai;
mod perplexity;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::ProviderConfig;
use crate::error::RouterError;
use crate::traits::ProviderAdapter;
use crate::transport::HttpTransport;
use crate::types::ProviderId;

/// Construct the concrete adapter for a provider config.
///
/// Fails when the config carries no usable API key; the router treats a
/// construction failure as "provider absent", not as a fatal error.
pub fn build_adapter(
    config: &ProviderConfig,
    transport: HttpTransport,
) -> Result<Arc<dyn ProviderAdapter>, RouterError> {
    let api_key = config
        .api_key
        .as_ref()
        .map(|key| key.expose_secret().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            RouterError::Authentication(format!("{}: missing API key", config.id))
        })?;

    let adapter: Arc<dyn ProviderAdapter> = match config.id {
        ProviderId::OpenAi => Arc::new(OpenAiAdapter::new(
            api_key,
            config.base_url.clone(),
            transport,
        )),
        ProviderId::Anthropic => Arc::new(AnthropicAdapter::new(
            api_key,
            config.base_url.clone(),
            transport,
        )),
        ProviderId::Gemini => Arc::new(GeminiAdapter::new(
            api_key,
            config.base_url.clone(),
            transport,
        )),
        ProviderId::Perplexity => Arc::new(PerplexityAdapter::new(
            api_key,
            config.base_url.clone(),
            transport,
        )),
    };
    Ok(adapter)
}
