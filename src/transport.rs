//! Resilient Transport
//!
//! Shared retry/backoff/timeout/error-classification logic used by every
//! adapter when calling its upstream HTTP endpoint. Classification order:
//! timeout → retryable; 401/403 → fail fast; 429 → honor `Retry-After`;
//! other non-2xx and network failures → exponential backoff until retries
//! are exhausted.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use tokio::time::sleep;

use crate::error::RouterError;
use crate::health::HealthMetrics;

/// Transport retry configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Base unit for the exponential backoff schedule
    /// (`backoff_unit * 2^attempt`).
    pub backoff_unit: Duration,
    /// Wait applied to a 429 response that carries no `Retry-After` header.
    pub rate_limit_fallback: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            backoff_unit: Duration::from_secs(1),
            rate_limit_fallback: Duration::from_secs(2),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub const fn with_rate_limit_fallback(mut self, fallback: Duration) -> Self {
        self.rate_limit_fallback = fallback;
        self
    }
}

/// HTTP transport shared by all adapters. Cheap to clone; the inner reqwest
/// client is reference-counted.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn with_client(client: reqwest::Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Issue a request with retries. `build` is called once per physical
    /// attempt; `health` counters are updated exactly once per attempt.
    ///
    /// Returns the raw response on the first 2xx; callers own body handling
    /// so streaming adapters can consume it incrementally.
    pub async fn execute<F>(
        &self,
        health: &HealthMetrics,
        build: F,
    ) -> Result<reqwest::Response, RouterError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut retries_remaining = self.config.max_retries;

        loop {
            health.record_attempt();
            let attempt = self.config.max_retries - retries_remaining;

            let outcome = tokio::time::timeout(
                self.config.timeout,
                build(&self.client).send(),
            )
            .await;

            let error = match outcome {
                Err(_) => {
                    health.record_error();
                    RouterError::Transport(format!(
                        "request timed out after {:?}",
                        self.config.timeout
                    ))
                }
                Ok(Err(err)) => {
                    health.record_error();
                    RouterError::Transport(err.to_string())
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    health.record_error();
                    match status.as_u16() {
                        401 | 403 => {
                            let body = body_excerpt(response).await;
                            return Err(RouterError::Authentication(format!(
                                "upstream returned {status}: {body}"
                            )));
                        }
                        429 => {
                            let retry_after = retry_after_delay(&response);
                            if retries_remaining > 0 {
                                let wait =
                                    retry_after.unwrap_or(self.config.rate_limit_fallback);
                                tracing::debug!(attempt, ?wait, "rate limited, backing off");
                                sleep(wait).await;
                                retries_remaining -= 1;
                                continue;
                            }
                            let body = body_excerpt(response).await;
                            return Err(RouterError::RateLimited {
                                message: body,
                                retry_after,
                            });
                        }
                        code => {
                            let body = body_excerpt(response).await;
                            RouterError::Upstream { status: code, body }
                        }
                    }
                }
            };

            if retries_remaining == 0 {
                return Err(error);
            }

            let wait = self.backoff_delay(attempt);
            tracing::debug!(attempt, ?wait, error = %error, "retrying after failure");
            sleep(wait).await;
            retries_remaining -= 1;
        }
    }

    /// [`HttpTransport::execute`] plus JSON body parsing. A body that fails
    /// to parse counts as a failed attempt on `health`.
    pub async fn execute_json<F>(
        &self,
        health: &HealthMetrics,
        build: F,
    ) -> Result<serde_json::Value, RouterError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let response = self.execute(health, build).await?;
        match response.json::<serde_json::Value>().await {
            Ok(value) => Ok(value),
            Err(err) => {
                health.record_error();
                Err(RouterError::Json(err.to_string()))
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        // 2^attempt units, attempt 0 being the first failed try.
        self.config.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn body_excerpt(response: reqwest::Response) -> String {
    const MAX_LEN: usize = 2048;
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_per_attempt() {
        let transport = HttpTransport::new(
            TransportConfig::new().with_backoff_unit(Duration::from_millis(100)),
        );
        assert_eq!(transport.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(transport.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(transport.backoff_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn config_builder_chain() {
        let config = TransportConfig::new()
            .with_max_retries(5)
            .with_timeout(Duration::from_secs(10))
            .with_rate_limit_fallback(Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.rate_limit_fallback, Duration::from_millis(250));
    }
}
