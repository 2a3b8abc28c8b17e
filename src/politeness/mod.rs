//! Politeness controller
//!
//! Tracks, per host, when the last request went out and what robots.txt
//! says. robots.txt is fetched at most once per host per run and the
//! decision is logged once per host:
//!
//! `[network_shield] robots provider=<p> host=<h> allowed=<b>`

use crate::config::PolitenessConfig;
use crate::destination::DestinationRules;
use crate::fetch::{FetchRequest, SafeFetcher};
use crate::robots::{fetch_robots, CachedRobots};
use crate::state::HostState;
use crate::url::extract_host;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

pub use crate::robots::MAX_CRAWL_DELAY;

/// Per-host spacing and robots.txt compliance
#[derive(Debug)]
pub struct PolitenessController {
    fetcher: SafeFetcher,
    robots_request: FetchRequest,
    robots_token: String,
    min_interval: Duration,
    check_robots: bool,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl PolitenessController {
    /// Creates a controller
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetcher used for robots.txt requests
    /// * `config` - Spacing and robots settings
    /// * `robots_token` - Product token matched against `User-agent` groups
    pub fn new(fetcher: SafeFetcher, config: &PolitenessConfig, robots_token: impl Into<String>) -> Self {
        let robots_request = FetchRequest::default()
            .with_timeout(config.robots_timeout())
            .with_max_bytes(config.robots_max_bytes);

        Self {
            fetcher,
            robots_request,
            robots_token: robots_token.into(),
            min_interval: config.min_host_interval(),
            check_robots: config.check_robots,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the destination rules robots.txt requests are validated against
    pub fn with_rules(mut self, rules: DestinationRules) -> Self {
        self.robots_request.rules = rules;
        self
    }

    /// Checks whether robots.txt allows fetching `url`
    ///
    /// The first call for a host fetches robots.txt; later calls reuse the
    /// cached rules. When robots checking is disabled everything is allowed.
    pub async fn check_robots(&self, provider: &str, url: &Url) -> bool {
        if !self.check_robots {
            return true;
        }
        let Some(host) = extract_host(url) else {
            return true;
        };

        let cached = self
            .hosts
            .lock()
            .get(&host)
            .and_then(|state| state.robots.clone());

        let robots = match cached {
            Some(robots) => robots,
            None => {
                // Fetched without the lock held; a concurrent first fetch for
                // the same host keeps whichever result landed first.
                let fetched = fetch_robots(&self.fetcher, url, &self.robots_request).await;
                let mut hosts = self.hosts.lock();
                let state = hosts.entry(host.clone()).or_default();
                state.robots.get_or_insert(fetched).clone()
            }
        };

        let allowed = robots.is_allowed(url.as_str(), &self.robots_token);

        let first_decision = {
            let mut hosts = self.hosts.lock();
            let state = hosts.entry(host.clone()).or_default();
            !std::mem::replace(&mut state.robots_logged, true)
        };
        if first_decision {
            tracing::info!(
                target: "network_shield",
                "[network_shield] robots provider={} host={} allowed={}",
                provider,
                host,
                allowed
            );
        }

        allowed
    }

    pub fn note_attempt(&self, host: &str) {
        self.note_attempt_at(host, Instant::now());
    }

    /// Records that a request to `host` is starting
    pub fn note_attempt_at(&self, host: &str, now: Instant) {
        self.hosts
            .lock()
            .entry(host.to_string())
            .or_default()
            .record_request(now);
    }

    pub fn wait_before(&self, host: &str) -> Duration {
        self.wait_before_at(host, Instant::now())
    }

    /// Time to wait before the next request to `host`
    ///
    /// The spacing is the larger of the configured minimum interval and the
    /// host's robots `Crawl-delay`.
    pub fn wait_before_at(&self, host: &str, now: Instant) -> Duration {
        let hosts = self.hosts.lock();
        let Some(state) = hosts.get(host) else {
            return Duration::ZERO;
        };

        let crawl_delay = state
            .robots
            .as_ref()
            .and_then(|robots| robots.crawl_delay(&self.robots_token))
            .unwrap_or(Duration::ZERO);

        state
            .time_until_next_request(self.min_interval.max(crawl_delay), now)
            .unwrap_or(Duration::ZERO)
    }

    /// Cached robots rules for `host`, if fetched this run
    pub fn robots_for(&self, host: &str) -> Option<CachedRobots> {
        self.hosts
            .lock()
            .get(host)
            .and_then(|state| state.robots.clone())
    }

    pub fn request_count(&self, host: &str) -> u32 {
        self.hosts
            .lock()
            .get(host)
            .map(|state| state.request_count)
            .unwrap_or(0)
    }

    /// Forgets all spacing and robots state
    pub fn reset(&self) {
        self.hosts.lock().clear();
    }
}
