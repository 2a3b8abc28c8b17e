//! URL helpers for the shield
//!
//! This module provides host extraction, allowlist pattern matching and the
//! small amount of URL arithmetic the fetcher needs (redirect resolution and
//! robots.txt location).

mod domain;
mod matcher;

pub use domain::{extract_host, normalize_host};
pub use matcher::{is_same_or_subdomain, matches_domain_pattern};

use url::Url;

/// Resolves a redirect `Location` header against the URL that returned it
///
/// Relative, scheme-relative and absolute locations are all accepted; the
/// fragment of the result is dropped since it is never sent to a server.
///
/// # Arguments
///
/// * `current` - The URL whose response carried the header
/// * `location` - The raw header value
///
/// # Returns
///
/// * `Some(Url)` - The absolute target
/// * `None` - If the location is empty or cannot be joined
///
/// # Examples
///
/// ```
/// use url::Url;
/// use network_shield::url::resolve_location;
///
/// let current = Url::parse("https://example.org/jobs/list").unwrap();
/// let next = resolve_location(&current, "../apply#top").unwrap();
/// assert_eq!(next.as_str(), "https://example.org/apply");
///
/// let next = resolve_location(&current, "http://127.0.0.1/private").unwrap();
/// assert_eq!(next.as_str(), "http://127.0.0.1/private");
/// ```
pub fn resolve_location(current: &Url, location: &str) -> Option<Url> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    let mut next = current.join(location).ok()?;
    next.set_fragment(None);
    Some(next)
}

/// Returns the robots.txt URL for the origin of `url`
///
/// # Examples
///
/// ```
/// use url::Url;
/// use network_shield::url::robots_url;
///
/// let url = Url::parse("https://jobs.example.com:8443/openings?page=2").unwrap();
/// assert_eq!(
///     robots_url(&url).unwrap().as_str(),
///     "https://jobs.example.com:8443/robots.txt"
/// );
/// ```
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    url.join("/robots.txt").ok()
}
