//! Router Configuration
//!
//! Provider configuration is supplied externally (settings storage, env,
//! composition root) and is immutable for the lifetime of one router
//! configuration. Replacing it rebuilds the adapter set atomically.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::types::ProviderId;

/// Configuration for one upstream provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub enabled: bool,
    /// API keys stay behind `SecretString` so they never leak through Debug
    /// or serialization.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Overrides the adapter's default endpoint when set.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            enabled: true,
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// True when the config carries a non-empty API key.
    pub fn has_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().is_empty())
    }

    /// Enabled providers without a usable key never become adapters.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.has_key()
    }
}

/// Full provider enumeration handed to the router. Order is fallback
/// priority order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterSettings {
    pub providers: Vec<ProviderConfig>,
}

impl RouterSettings {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyless_or_disabled_config_is_not_usable() {
        let keyless = ProviderConfig::new(ProviderId::OpenAi);
        assert!(!keyless.is_usable());

        let empty_key = ProviderConfig::new(ProviderId::OpenAi).with_api_key("");
        assert!(!empty_key.is_usable());

        let disabled = ProviderConfig::new(ProviderId::OpenAi)
            .with_api_key("sk-test")
            .with_enabled(false);
        assert!(!disabled.is_usable());

        let usable = ProviderConfig::new(ProviderId::OpenAi).with_api_key("sk-test");
        assert!(usable.is_usable());
    }

    #[test]
    fn api_key_does_not_leak_through_debug() {
        let config = ProviderConfig::new(ProviderId::Anthropic).with_api_key("sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn settings_deserialize_from_json() {
        let settings: RouterSettings = serde_json::from_value(serde_json::json!({
            "providers": [
                {"id": "openai", "enabled": true, "api_key": "sk-a"},
                {"id": "gemini", "enabled": false}
            ]
        }))
        .unwrap();
        assert_eq!(settings.providers.len(), 2);
        assert!(settings.providers[0].is_usable());
        assert!(!settings.providers[1].is_usable());
    }
}
