//! Per-run robots.txt cache entry

use crate::robots::ParsedRobots;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where a host's robots rules came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsSource {
    /// A robots.txt body was fetched
    Fetched,

    /// The host answered 4xx; nothing to enforce
    Missing,

    /// The fetch failed or was refused; defaulted to allow
    Unavailable,
}

/// Robots rules for a host, as cached for the rest of the run
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: ParsedRobots,
    pub source: RobotsSource,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: ParsedRobots, source: RobotsSource) -> Self {
        Self {
            rules,
            source,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.rules.is_allowed(url, user_agent)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules.crawl_delay(user_agent)
    }
}
