//! Provider Router
//!
//! Holds the live set of configured adapters and executes call-with-fallback
//! across them. Candidate order is configuration order; a provider with a
//! high recent error rate is not demoted. Individual adapter failures are
//! logged and swallowed during iteration; only total failure surfaces, as an
//! absent result the caller should treat as "try later".

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::RouterSettings;
use crate::error::RouterError;
use crate::health::HealthSnapshot;
use crate::providers::build_adapter;
use crate::streaming::TextStream;
use crate::traits::ProviderAdapter;
use crate::transport::{HttpTransport, TransportConfig};
use crate::types::{
    Capability, ImageRequest, ImageResponse, ProviderId, SearchRequest, SearchResponse,
    TextRequest, TextResponse, VisionRequest, VisionResponse,
};

/// Router-level configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Transport settings shared by every adapter the router constructs.
    pub transport: TransportConfig,
    /// When set, each adapter is guarded by its own circuit breaker with
    /// these thresholds.
    pub breaker: Option<CircuitBreakerConfig>,
}

#[derive(Clone)]
struct AdapterEntry {
    adapter: Arc<dyn ProviderAdapter>,
    breaker: Option<Arc<CircuitBreaker>>,
}

type InvokeFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = Result<T, RouterError>> + Send + 'a>>;

/// Capability-dispatching router over the configured provider adapters.
pub struct ProviderRouter {
    config: RouterConfig,
    transport: HttpTransport,
    entries: RwLock<Arc<Vec<AdapterEntry>>>,
    settings: RwLock<Arc<RouterSettings>>,
    initialized: AtomicBool,
}

impl ProviderRouter {
    /// Create an empty router; call [`ProviderRouter::initialize`] before
    /// dispatching.
    pub fn new(config: RouterConfig) -> Self {
        let transport = HttpTransport::new(config.transport.clone());
        Self {
            config,
            transport,
            entries: RwLock::new(Arc::new(Vec::new())),
            settings: RwLock::new(Arc::new(RouterSettings::default())),
            initialized: AtomicBool::new(false),
        }
    }

    /// Wire the router with externally constructed adapters, bypassing the
    /// built-in provider set. Entry order is fallback priority order.
    pub fn with_adapters(config: RouterConfig, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let router = Self::new(config);
        router.install(
            adapters
                .into_iter()
                .map(|adapter| router.entry_for(adapter))
                .collect(),
        );
        router
    }

    /// Build the adapter set from settings. The previous set is replaced
    /// wholesale; in-flight calls keep the instances captured at call start.
    pub fn initialize(&self, settings: RouterSettings) {
        let mut entries = Vec::with_capacity(settings.providers.len());
        for provider in &settings.providers {
            if !provider.enabled {
                tracing::debug!(provider = %provider.id, "provider disabled, skipping");
                continue;
            }
            if !provider.has_key() {
                tracing::warn!(provider = %provider.id, "provider has no API key, skipping");
                continue;
            }
            match build_adapter(provider, self.transport.clone()) {
                Ok(adapter) => entries.push(self.entry_for(adapter)),
                Err(err) => {
                    // Degraded, not fatal: the provider is simply absent.
                    tracing::warn!(provider = %provider.id, error = %err, "failed to construct adapter");
                }
            }
        }

        *self
            .settings
            .write()
            .expect("router settings lock is not poisoned") = Arc::new(settings);
        self.install(entries);
    }

    /// Alias of [`ProviderRouter::initialize`] for reconfiguration.
    pub fn update_settings(&self, settings: RouterSettings) {
        self.initialize(settings);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Current configuration snapshot.
    pub fn settings(&self) -> Arc<RouterSettings> {
        self.settings
            .read()
            .expect("router settings lock is not poisoned")
            .clone()
    }

    /// True if any live adapter's provider kind declares the capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.snapshot()
            .iter()
            .any(|entry| entry.adapter.id().supports(capability))
    }

    /// Number of live adapters.
    pub fn adapter_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Chat across text-capable providers; `None` when every candidate
    /// failed or none exists.
    pub async fn chat(&self, request: TextRequest) -> Option<TextResponse> {
        self.dispatch(Capability::Text, false, |adapter| {
            let request = request.clone();
            Box::pin(async move { adapter.chat(request).await })
        })
        .await
    }

    /// One-shot prompt convenience over [`ProviderRouter::chat`].
    pub async fn ask(&self, prompt: impl Into<String>) -> Option<String> {
        self.chat(TextRequest::from_prompt(prompt.into()))
            .await
            .map(|response| response.text)
    }

    pub async fn vision(&self, request: VisionRequest) -> Option<VisionResponse> {
        self.dispatch(Capability::Vision, false, |adapter| {
            let request = request.clone();
            Box::pin(async move { adapter.vision(request).await })
        })
        .await
    }

    pub async fn generate_image(&self, request: ImageRequest) -> Option<ImageResponse> {
        self.dispatch(Capability::ImageGen, false, |adapter| {
            let request = request.clone();
            Box::pin(async move { adapter.generate_image(request).await })
        })
        .await
    }

    pub async fn search(&self, request: SearchRequest) -> Option<SearchResponse> {
        self.dispatch(Capability::Search, false, |adapter| {
            let request = request.clone();
            Box::pin(async move { adapter.search(request).await })
        })
        .await
    }

    /// Streaming chat; additionally filters to adapters that report
    /// streaming support.
    pub async fn stream_chat(&self, request: TextRequest) -> Option<TextStream> {
        self.dispatch(Capability::Text, true, |adapter| {
            let request = request.clone();
            Box::pin(async move { adapter.stream_chat(request).await })
        })
        .await
    }

    /// Health snapshots for every live adapter, in priority order.
    pub fn health_report(&self) -> Vec<HealthSnapshot> {
        self.snapshot()
            .iter()
            .map(|entry| entry.adapter.health())
            .collect()
    }

    /// Zero one adapter's health counters. Returns false when the provider
    /// has no live adapter.
    pub fn reset_provider_health(&self, provider: ProviderId) -> bool {
        let entries = self.snapshot();
        match entries.iter().find(|entry| entry.adapter.id() == provider) {
            Some(entry) => {
                entry.adapter.reset_health();
                true
            }
            None => false,
        }
    }

    async fn dispatch<T, F>(&self, capability: Capability, streaming: bool, mut invoke: F) -> Option<T>
    where
        F: for<'a> FnMut(&'a dyn ProviderAdapter) -> InvokeFuture<'a, T>,
    {
        let entries = self.snapshot();
        let candidates = entries.iter().filter(|entry| {
            entry.adapter.id().supports(capability)
                && (!streaming || entry.adapter.supports_streaming())
        });

        for entry in candidates {
            let result = match &entry.breaker {
                Some(breaker) => breaker
                    .execute(|| invoke(entry.adapter.as_ref()))
                    .await
                    .map_err(RouterError::from),
                None => invoke(entry.adapter.as_ref()).await,
            };

            match result {
                Ok(value) => return Some(value),
                Err(err) => {
                    tracing::warn!(
                        provider = %entry.adapter.id(),
                        capability = %capability,
                        error = %err,
                        "provider call failed, trying next candidate"
                    );
                }
            }
        }

        tracing::debug!(capability = %capability, "no provider produced a result");
        None
    }

    fn entry_for(&self, adapter: Arc<dyn ProviderAdapter>) -> AdapterEntry {
        AdapterEntry {
            adapter,
            breaker: self
                .config
                .breaker
                .map(|config| Arc::new(CircuitBreaker::new(config))),
        }
    }

    fn install(&self, entries: Vec<AdapterEntry>) {
        *self
            .entries
            .write()
            .expect("router adapter lock is not poisoned") = Arc::new(entries);
        self.initialized.store(true, Ordering::Release);
    }

    fn snapshot(&self) -> Arc<Vec<AdapterEntry>> {
        self.entries
            .read()
            .expect("router adapter lock is not poisoned")
            .clone()
    }
}
