//! Per-host circuit breaker
//!
//! After `failure_threshold` consecutive failures a host is refused without
//! touching the network until `cooldown` has passed. One probe request is
//! then let through: success closes the breaker, failure reopens it with a
//! fresh cooldown.
//!
//! Every method has an `_at` form taking `now` so tests can drive the clock.
//!
//! Requests go out under a [`BreakerPermit`]. A permit holding the probe
//! hands it back if it is dropped without an outcome, so an attempt that is
//! cancelled mid-flight leaves the host half-open instead of wedged.

use crate::config::BreakerConfig;
use crate::state::{BreakerPhase, BreakerState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Registry of breaker state keyed by host
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    hosts: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_open(&self, host: &str) -> bool {
        self.is_open_at(host, Instant::now())
    }

    /// Whether `host` is inside its cooldown window
    pub fn is_open_at(&self, host: &str, now: Instant) -> bool {
        self.hosts
            .lock()
            .get(host)
            .is_some_and(|state| state.phase(now) == BreakerPhase::Open)
    }

    /// Asks to send a request to `host`
    ///
    /// # Returns
    ///
    /// * `Ok(BreakerPermit)` - Go ahead; report the outcome through the permit
    /// * `Err(Duration)` - Refused; how long until a probe may be attempted
    pub fn try_acquire(&self, host: &str, now: Instant) -> Result<BreakerPermit<'_>, Duration> {
        let probe = match self.hosts.lock().get_mut(host) {
            Some(state) => state.try_acquire(now)?,
            None => false,
        };

        Ok(BreakerPermit {
            breaker: self,
            host: host.to_string(),
            probe,
        })
    }

    pub fn record_failure(&self, host: &str) -> bool {
        self.record_failure_at(host, Instant::now())
    }

    /// Counts a failure for `host`
    ///
    /// # Returns
    ///
    /// `true` if this failure opened the breaker
    pub fn record_failure_at(&self, host: &str, now: Instant) -> bool {
        let mut hosts = self.hosts.lock();
        let state = hosts.entry(host.to_string()).or_default();
        let tripped = state.record_failure(self.failure_threshold, self.cooldown, now);

        if tripped {
            tracing::debug!(
                "Circuit opened for {} after {} failures",
                host,
                state.consecutive_failures
            );
        }
        tripped
    }

    /// Closes the breaker for `host` and forgets its failures
    pub fn record_success(&self, host: &str) {
        self.hosts.lock().remove(host);
    }

    /// Releases a half-open probe without counting success or failure
    ///
    /// Used when an attempt was rejected before any request left, so the
    /// next caller can probe instead of waiting on a probe that never ran.
    pub fn release(&self, host: &str) {
        if let Some(state) = self.hosts.lock().get_mut(host) {
            state.release_probe();
        }
    }

    pub fn consecutive_failures(&self, host: &str) -> u32 {
        self.hosts
            .lock()
            .get(host)
            .map(|state| state.consecutive_failures)
            .unwrap_or(0)
    }

    pub fn reset(&self, host: &str) {
        self.hosts.lock().remove(host);
    }

    pub fn reset_all(&self) {
        self.hosts.lock().clear();
    }
}

/// Leave to send one request to a host
///
/// Consumed by [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping it any other way
/// releases the half-open probe, if it holds one.
#[must_use = "dropping a permit releases it without recording an outcome"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    host: String,
    probe: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit is the single half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.probe = false;
        self.breaker.record_success(&self.host);
    }

    /// Counts a failure; `true` if it opened the breaker
    pub fn record_failure(self) -> bool {
        self.record_failure_at(Instant::now())
    }

    pub fn record_failure_at(mut self, now: Instant) -> bool {
        self.probe = false;
        self.breaker.record_failure_at(&self.host, now)
    }

    /// Gives the permit back without an outcome
    pub fn release(self) {}
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.probe {
            self.breaker.release(&self.host);
        }
    }
}
