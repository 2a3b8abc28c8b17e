use std::time::{Duration, Instant};

/// Where a host's breaker currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    /// Requests flow normally
    Closed,

    /// Requests are refused until the cooldown ends
    Open,

    /// Cooldown ended; a single probe request may go through
    HalfOpen,
}

/// Circuit breaker state for one host
///
/// Created on the first failure and dropped on success or reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakerState {
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub half_open_probe_in_flight: bool,
}

impl BreakerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, now: Instant) -> BreakerPhase {
        match self.cooldown_until {
            None => BreakerPhase::Closed,
            Some(until) if now < until => BreakerPhase::Open,
            Some(_) => BreakerPhase::HalfOpen,
        }
    }

    /// Asks to send a request
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The request may go out as the half-open probe
    /// * `Ok(false)` - The request may go out; the breaker is closed
    /// * `Err(Duration)` - Refused; the time left on the cooldown, or zero
    ///   while another task holds the probe
    pub fn try_acquire(&mut self, now: Instant) -> Result<bool, Duration> {
        match self.phase(now) {
            BreakerPhase::Closed => Ok(false),
            BreakerPhase::Open => Err(self.remaining(now)),
            BreakerPhase::HalfOpen if self.half_open_probe_in_flight => Err(Duration::ZERO),
            BreakerPhase::HalfOpen => {
                self.half_open_probe_in_flight = true;
                Ok(true)
            }
        }
    }

    /// Counts a failure and opens the breaker when it should trip
    ///
    /// A failed half-open probe reopens immediately. Failures that arrive
    /// while already open only add to the count.
    ///
    /// # Returns
    ///
    /// `true` if this failure opened the breaker
    pub fn record_failure(&mut self, threshold: u32, cooldown: Duration, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let trip = match self.phase(now) {
            BreakerPhase::Open => false,
            BreakerPhase::HalfOpen => true,
            BreakerPhase::Closed => self.consecutive_failures >= threshold,
        };

        if trip {
            self.opened_at = Some(now);
            self.cooldown_until = Some(now + cooldown);
            self.half_open_probe_in_flight = false;
        }
        trip
    }

    /// Gives back a half-open probe whose request never reached the host
    pub fn release_probe(&mut self) {
        self.half_open_probe_in_flight = false;
    }

    /// Time left before the breaker goes half-open
    pub fn remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
