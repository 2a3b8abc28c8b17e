//! Robots.txt handling
//!
//! robots.txt is fetched through the [`SafeFetcher`] like any other URL, so
//! a hostile robots location gets the same SSRF treatment as a page.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsSource};
pub use parser::{ParsedRobots, MAX_CRAWL_DELAY};

use crate::fetch::{FetchRequest, SafeFetcher};
use crate::url::robots_url;
use url::Url;

/// Fetches and parses robots.txt for the origin of `url`
///
/// Never fails: a 4xx means there are no rules, and any other failure
/// (5xx, transport error, blocked destination) defaults to allow with a
/// warning.
///
/// # Arguments
///
/// * `fetcher` - Fetcher used for the request
/// * `url` - Any URL on the host
/// * `request` - Limits for the robots request (small byte cap)
pub async fn fetch_robots(fetcher: &SafeFetcher, url: &Url, request: &FetchRequest) -> CachedRobots {
    let Some(location) = robots_url(url) else {
        return CachedRobots::new(ParsedRobots::allow_all(), RobotsSource::Unavailable);
    };

    match fetcher.get_text(location.as_str(), request).await {
        Ok(result) if (200..300).contains(&result.status_code) => {
            tracing::debug!("Fetched robots.txt from {} ({} bytes)", location, result.bytes_len);
            CachedRobots::new(ParsedRobots::from_content(&result.text), RobotsSource::Fetched)
        }
        Ok(result) if (400..500).contains(&result.status_code) => {
            tracing::debug!("No robots.txt at {} (HTTP {})", location, result.status_code);
            CachedRobots::new(ParsedRobots::allow_all(), RobotsSource::Missing)
        }
        Ok(result) => {
            tracing::warn!(
                "robots.txt at {} returned HTTP {}, allowing",
                location,
                result.status_code
            );
            CachedRobots::new(ParsedRobots::allow_all(), RobotsSource::Unavailable)
        }
        Err(e) => {
            tracing::warn!("robots.txt fetch failed for {}: {}, allowing", location, e);
            CachedRobots::new(ParsedRobots::allow_all(), RobotsSource::Unavailable)
        }
    }
}
