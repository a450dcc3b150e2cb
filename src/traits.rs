//! Adapter Contract
//!
//! Every provider integration implements [`ProviderAdapter`]. Operations a
//! provider does not support fail fast with
//! [`RouterError::UnsupportedCapability`] through the default method bodies;
//! an adapter must never silently no-op.

use async_trait::async_trait;

use crate::error::RouterError;
use crate::health::HealthSnapshot;
use crate::streaming::TextStream;
use crate::types::{
    Capability, ImageRequest, ImageResponse, ProviderId, SearchRequest, SearchResponse,
    TextRequest, TextResponse, VisionRequest, VisionResponse,
};

/// Capability interface for one upstream provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Static capability declaration for this provider kind.
    fn capabilities(&self) -> &'static [Capability] {
        self.id().capabilities()
    }

    async fn chat(&self, request: TextRequest) -> Result<TextResponse, RouterError> {
        let _ = request;
        Err(RouterError::unsupported(self.id(), Capability::Text))
    }

    async fn vision(&self, request: VisionRequest) -> Result<VisionResponse, RouterError> {
        let _ = request;
        Err(RouterError::unsupported(self.id(), Capability::Vision))
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, RouterError> {
        let _ = request;
        Err(RouterError::unsupported(self.id(), Capability::ImageGen))
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, RouterError> {
        let _ = request;
        Err(RouterError::unsupported(self.id(), Capability::Search))
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Finite, single-consumption chunk stream. Not restartable.
    async fn stream_chat(&self, request: TextRequest) -> Result<TextStream, RouterError> {
        let _ = request;
        Err(RouterError::unsupported(self.id(), Capability::Text))
    }

    /// Point-in-time health counters for this adapter instance.
    fn health(&self) -> HealthSnapshot;

    /// Zero the health counters without touching breaker or configuration
    /// state.
    fn reset_health(&self);
}
