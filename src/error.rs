//! Error Handling Module
//!
//! Every raw failure an adapter can hit (HTTP status, network, parse) is
//! normalized into a [`RouterError`] before it crosses a module boundary.
//! The retry layer keys off [`RouterError::is_retryable`], the router
//! swallows individual adapter errors during fallback iteration.

use std::time::Duration;

use crate::types::{Capability, ProviderId};

/// Unified error type for the routing core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// HTTP 401/403. Never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// HTTP 429 after retries were exhausted.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-advertised wait, when a `Retry-After` header was present.
        retry_after: Option<Duration>,
    },

    /// Network-level failure or request timeout. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response that is neither an auth nor a rate-limit failure,
    /// surfaced with status and body after retries were exhausted.
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The adapter does not implement the requested capability.
    #[error("provider {provider} does not support {capability}")]
    UnsupportedCapability {
        provider: ProviderId,
        capability: Capability,
    },

    /// Fast-fail from an open circuit breaker; the guarded operation was
    /// never invoked.
    #[error("circuit breaker is open, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// The request cannot be expressed on this provider's wire protocol.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response body could not be parsed.
    #[error("json error: {0}")]
    Json(String),

    /// Invariant violation inside the library itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Shorthand for the capability-not-supported failure adapters raise
    /// from their default trait methods.
    pub const fn unsupported(provider: ProviderId, capability: Capability) -> Self {
        Self::UnsupportedCapability {
            provider,
            capability,
        }
    }

    /// Whether the transport layer may retry after this error.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Upstream { .. } | Self::RateLimited { .. } => true,
            Self::Authentication(_)
            | Self::UnsupportedCapability { .. }
            | Self::CircuitOpen { .. }
            | Self::InvalidRequest(_)
            | Self::Json(_)
            | Self::Internal(_) => false,
        }
    }

    /// HTTP status associated with this error, when one exists.
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
