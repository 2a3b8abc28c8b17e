use crate::robots::CachedRobots;
use std::time::{Duration, Instant};

/// Politeness state for one host
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Requests started against this host in the current run
    pub request_count: u32,

    /// When the last request to this host started
    pub last_request_time: Option<Instant>,

    /// robots.txt rules, fetched at most once per run
    pub robots: Option<CachedRobots>,

    /// Whether the robots decision has been logged for this host
    pub robots_logged: bool,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request is about to be sent
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates how long to wait before the next request
    ///
    /// # Arguments
    ///
    /// * `interval` - Required spacing between requests to this host
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// `None` if a request may be sent now, otherwise the remaining wait
    pub fn time_until_next_request(&self, interval: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < interval).then(|| interval - elapsed)
    }
}
