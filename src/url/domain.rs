use url::{Host, Url};

/// Extracts the host from a URL in the form used for policy checks
///
/// The host is lowercased and a trailing root dot (`example.com.`) is
/// dropped so `example.com.` cannot slip past an allowlist entry for
/// `example.com`. IPv6 literals are returned without brackets.
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Some(String)` - The normalized host
/// * `None` - If the URL has no host or the host is empty
///
/// # Examples
///
/// ```
/// use url::Url;
/// use network_shield::url::extract_host;
///
/// let url = Url::parse("https://Jobs.Example.COM./openings").unwrap();
/// assert_eq!(extract_host(&url), Some("jobs.example.com".to_string()));
///
/// let url = Url::parse("http://[::1]:8080/").unwrap();
/// assert_eq!(extract_host(&url), Some("::1".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = match url.host()? {
        Host::Domain(domain) => normalize_host(domain),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Lowercases a host name and strips a single trailing dot
pub fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}
