//! Adapter Health Accounting
//!
//! Every adapter owns one [`HealthMetrics`]. Counters are bumped once per
//! physical network attempt; last-write-wins is acceptable for metrics, so
//! plain atomic increments suffice.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ProviderId;

/// Mutable health counters owned by one live adapter.
#[derive(Debug, Default)]
pub struct HealthMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    last_request: Mutex<Option<DateTime<Utc>>>,
}

impl HealthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one physical attempt, before network I/O starts.
    pub fn record_attempt(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_request
            .lock()
            .expect("health lock is not poisoned");
        *last = Some(Utc::now());
    }

    /// Record one failed attempt.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the counters. Circuit-breaker and configuration state are
    /// unaffected.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        let mut last = self
            .last_request
            .lock()
            .expect("health lock is not poisoned");
        *last = None;
    }

    pub fn snapshot(&self, provider: ProviderId) -> HealthSnapshot {
        let request_count = self.requests.load(Ordering::Relaxed);
        let error_count = self.errors.load(Ordering::Relaxed);
        let error_rate = if request_count == 0 {
            0.0
        } else {
            error_count as f64 / request_count as f64
        };
        let last_request_time = *self
            .last_request
            .lock()
            .expect("health lock is not poisoned");

        HealthSnapshot {
            provider,
            request_count,
            error_count,
            error_rate,
            last_request_time,
        }
    }
}

/// Stable read contract for external observability tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub provider: ProviderId,
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub last_request_time: Option<DateTime<Utc>>,
}
