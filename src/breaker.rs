//! Circuit Breaker
//!
//! Generic three-state failure-isolation primitive. One breaker instance
//! typically guards one adapter or one logical operation, but the wrapper is
//! usable for any fallible async operation: the wrapped error type flows
//! through [`BreakerError`] untouched.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Runtime circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

/// Breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Successful probes required to close again from half-open.
    pub success_threshold: u32,
    /// How long an open circuit rejects calls before allowing a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was never invoked.
    #[error("circuit open, next attempt allowed in {retry_in:?}")]
    Open { retry_in: Duration },
    /// The operation ran and failed; the inner error is preserved.
    #[error(transparent)]
    Inner(E),
}

impl From<BreakerError<crate::error::RouterError>> for crate::error::RouterError {
    fn from(err: BreakerError<crate::error::RouterError>) -> Self {
        match err {
            BreakerError::Open { retry_in } => Self::CircuitOpen { retry_in },
            BreakerError::Inner(inner) => inner,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            next_attempt: None,
        }
    }
}

type StateListener = Box<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Thread-safe circuit breaker. State transitions are total functions of
/// (current state, event, elapsed time); the lock is never held across an
/// await point.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listener: Option<StateListener>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::default()),
            listener: None,
        }
    }

    /// Observe every state transition as `(from, to)`.
    pub fn with_state_listener(
        mut self,
        listener: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Run `operation` under the breaker. When the circuit is open and the
    /// reset deadline has not passed, fails fast without invoking it. The
    /// first call after the deadline transitions to half-open, then runs.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Force the breaker closed with both counters zeroed, from any state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        inner.next_attempt = None;
        drop(inner);
        if from != CircuitState::Closed {
            self.notify(from, CircuitState::Closed);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .expect("breaker lock is not poisoned")
            .state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock is not poisoned")
            .failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock is not poisoned")
            .success_count
    }

    fn before_call<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let now = Instant::now();
        let deadline = inner.next_attempt.unwrap_or(now);
        if now < deadline {
            return Err(BreakerError::Open {
                retry_in: deadline - now,
            });
        }

        // Deadline passed: this call becomes the half-open probe.
        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        inner.next_attempt = None;
        drop(inner);
        self.notify(CircuitState::Open, CircuitState::HalfOpen);
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        match inner.state {
            CircuitState::Closed => {
                // Failures do not accumulate across unrelated successes.
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.last_failure = None;
                    drop(inner);
                    tracing::debug!("circuit breaker closed after successful probes");
                    self.notify(CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let tripped = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if tripped && inner.state != CircuitState::Open {
            let from = inner.state;
            inner.state = CircuitState::Open;
            inner.success_count = 0;
            inner.next_attempt = Some(Instant::now() + self.config.reset_timeout);
            let failures = inner.failure_count;
            drop(inner);
            tracing::warn!(failures, "circuit breaker opened");
            self.notify(from, CircuitState::Open);
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        if let Some(listener) = &self.listener {
            listener(from, to);
        }
    }
}
