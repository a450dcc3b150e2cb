//! llm-router
//!
//! Resilient multi-provider LLM request routing. Capability-typed requests
//! (chat, vision, image generation, search, streaming text) are dispatched
//! across independently-failing upstream providers with fallback, so a
//! subset of providers being down, rate-limited or misconfigured degrades
//! service instead of breaking it.
//!
//! Building blocks:
//! - [`traits::ProviderAdapter`] — the capability contract every provider
//!   integration implements
//! - [`transport::HttpTransport`] — shared retry/backoff/timeout/error
//!   classification
//! - [`breaker::CircuitBreaker`] — generic three-state failure isolation
//! - [`router::ProviderRouter`] — configuration-ordered call-with-fallback
//! - [`batcher::RequestBatcher`] — deduplicating time/size-triggered batching
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_router::prelude::*;
//!
//! let router = ProviderRouter::new(RouterConfig::default());
//! router.initialize(RouterSettings::new(vec![
//!     ProviderConfig::new(ProviderId::OpenAi).with_api_key(key),
//!     ProviderConfig::new(ProviderId::Anthropic).with_api_key(fallback_key),
//! ]));
//!
//! // `None` means "no provider available right now", not a hard failure.
//! let answer = router.ask("What is a circuit breaker?").await;
//! ```
#![deny(unsafe_code)]

pub mod batcher;
pub mod breaker;
pub mod config;
pub mod error;
pub mod health;
pub mod providers;
pub mod router;
pub mod streaming;
pub mod traits;
pub mod transport;
pub mod types;

pub use error::RouterError;

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::batcher::{BatchItem, BatcherConfig, RequestBatcher};
    pub use crate::breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::config::{ProviderConfig, RouterSettings};
    pub use crate::error::RouterError;
    pub use crate::health::HealthSnapshot;
    pub use crate::router::{ProviderRouter, RouterConfig};
    pub use crate::streaming::TextStream;
    pub use crate::traits::ProviderAdapter;
    pub use crate::transport::{HttpTransport, TransportConfig};
    pub use crate::types::{
        Capability, ChatMessage, GeneratedImage, ImageRequest, ImageResponse, ImageSource,
        MessageRole, ProviderId, SearchRequest, SearchResponse, SearchResult, TextRequest,
        TextResponse, VisionRequest, VisionResponse,
    };
}
