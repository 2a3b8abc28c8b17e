/// Checks if a host matches an allowlist pattern
///
/// Three pattern forms are supported:
/// 1. Exact: `example.com` matches only `example.com`
/// 2. Leading dot: `.example.com` matches `example.com` and any subdomain
/// 3. Star: `*.example.com` behaves like `.example.com`
///
/// Both sides are compared case-insensitively with trailing dots ignored.
///
/// # Arguments
///
/// * `pattern` - The allowlist entry
/// * `candidate` - The host to check
///
/// # Examples
///
/// ```
/// use network_shield::url::matches_domain_pattern;
///
/// assert!(matches_domain_pattern("example.com", "example.com"));
/// assert!(!matches_domain_pattern("example.com", "jobs.example.com"));
///
/// assert!(matches_domain_pattern(".example.com", "jobs.example.com"));
/// assert!(matches_domain_pattern("*.example.com", "example.com"));
/// assert!(!matches_domain_pattern("*.example.com", "badexample.com"));
/// ```
pub fn matches_domain_pattern(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();

    if let Some(base) = pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
    {
        is_same_or_subdomain(candidate, base)
    } else {
        !pattern.is_empty() && candidate.trim_end_matches('.').eq_ignore_ascii_case(&pattern)
    }
}

/// Returns true when `candidate` equals `domain` or is a subdomain of it
///
/// The check is label-aligned: `notexample.com` is not a subdomain of
/// `example.com`.
pub fn is_same_or_subdomain(candidate: &str, domain: &str) -> bool {
    let candidate = candidate.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase();

    if domain.is_empty() || candidate.is_empty() {
        return false;
    }

    candidate == domain || candidate.ends_with(&format!(".{}", domain))
}
