//! Destination validation
//!
//! Decides whether a URL may be contacted. The rules run in a fixed order
//! and the first failing rule produces the [`BlockReason`]:
//!
//! 1. Scheme must be in the allowed set
//! 2. No userinfo in the URL
//! 3. Host present and not `localhost`
//! 4. Host in the explicit host allowlist, when one is given
//! 5. Host within the explicit domain allowlist, when one is given, and
//!    allowed by the attached egress policy, when one is attached
//! 6. Literal IPs are classified directly
//! 7. Names are resolved once; every distinct answer must be allowed
//!
//! The addresses that passed step 6/7 are returned so the fetcher can pin
//! its connection to exactly what was checked.

mod classify;
mod resolver;

pub use classify::{canonical_ip, classify_ip};
pub use resolver::{Resolver, StaticResolver, SystemResolver};

use crate::policy::AllowlistPolicy;
use crate::url::{extract_host, is_same_or_subdomain};
use crate::{BlockReason, NetworkShieldError};
use std::net::{IpAddr, SocketAddr};
use url::{Host, Url};

/// Schemes allowed when the caller does not say otherwise
pub const DEFAULT_ALLOW_SCHEMES: &[&str] = &["http", "https"];

/// The rule set a destination is checked against
#[derive(Debug, Clone)]
pub struct DestinationRules {
    /// Allowed URL schemes, compared case-insensitively
    pub allow_schemes: Vec<String>,

    /// Exact host allowlist; `None` disables the check
    pub allow_hosts: Option<Vec<String>>,

    /// Domain allowlist (host must equal or be a subdomain of an entry);
    /// `None` disables the check
    pub allow_domains: Option<Vec<String>>,

    /// Egress policy applied to every hop, including redirect targets
    pub egress_policy: Option<AllowlistPolicy>,

    /// Exact socket addresses exempt from address classification
    ///
    /// Only meant for local test servers and sidecars. A redirect to the
    /// same IP on any other port is still classified and blocked.
    pub trusted_endpoints: Vec<SocketAddr>,
}

impl Default for DestinationRules {
    fn default() -> Self {
        Self {
            allow_schemes: DEFAULT_ALLOW_SCHEMES.iter().map(|s| s.to_string()).collect(),
            allow_hosts: None,
            allow_domains: None,
            egress_policy: None,
            trusted_endpoints: Vec::new(),
        }
    }
}

impl DestinationRules {
    pub fn with_allow_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allow_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_egress_policy(mut self, policy: AllowlistPolicy) -> Self {
        self.egress_policy = Some(policy);
        self
    }

    pub fn trust_endpoint(mut self, addr: SocketAddr) -> Self {
        self.trusted_endpoints.push(addr);
        self
    }

    fn scheme_allowed(&self, scheme: &str) -> bool {
        self.allow_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }

    fn is_trusted(&self, ip: IpAddr, port: u16) -> bool {
        self.trusted_endpoints
            .iter()
            .any(|endpoint| canonical_ip(endpoint.ip()) == ip && endpoint.port() == port)
    }
}

/// A destination that passed every rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDestination {
    /// The validated URL
    pub url: Url,

    /// Normalized host (lowercase, no trailing dot, no IPv6 brackets)
    pub host: String,

    /// Port the connection will use
    pub port: u16,

    /// Distinct allowed addresses in resolver order (mapped IPv6 unwrapped)
    pub addrs: Vec<IpAddr>,

    /// Whether the URL named an IP literal rather than a host name
    pub is_ip_literal: bool,
}

impl ValidatedDestination {
    /// The address the connection must be pinned to
    pub fn pinned_addr(&self) -> SocketAddr {
        // addrs is never empty for a validated destination
        SocketAddr::new(self.addrs[0], self.port)
    }
}

/// Parses a raw URL, mapping parse failures onto block reasons
///
/// A URL without a scheme is reported as `scheme_not_allowed`; every other
/// parse failure means no usable host could be found and is reported as
/// `host_missing`.
pub fn parse_destination(raw: &str) -> Result<Url, NetworkShieldError> {
    Url::parse(raw.trim()).map_err(|e| {
        let reason = match e {
            url::ParseError::RelativeUrlWithoutBase => BlockReason::SchemeNotAllowed {
                scheme: String::new(),
            },
            _ => BlockReason::HostMissing,
        };
        NetworkShieldError::new(raw, reason)
    })
}

/// Applies rules 1 through 5, which need no network access
///
/// # Returns
///
/// * `Ok((host, port))` - The normalized host and the target port
/// * `Err(NetworkShieldError)` - The first rule that failed
pub fn check_static_rules(
    url: &Url,
    rules: &DestinationRules,
) -> Result<(String, u16), NetworkShieldError> {
    let block = |reason| NetworkShieldError::new(url.as_str(), reason);

    if !rules.scheme_allowed(url.scheme()) {
        return Err(block(BlockReason::SchemeNotAllowed {
            scheme: url.scheme().to_string(),
        }));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(block(BlockReason::CredentialsInUrl));
    }

    let host = extract_host(url).ok_or_else(|| block(BlockReason::HostMissing))?;
    if host == "localhost" {
        return Err(block(BlockReason::HostIsLocalhost));
    }

    if let Some(hosts) = &rules.allow_hosts {
        if !hosts.iter().any(|h| crate::url::normalize_host(h) == host) {
            return Err(block(BlockReason::HostNotInAllowlist { host }));
        }
    }

    if let Some(domains) = &rules.allow_domains {
        if !domains.iter().any(|d| is_same_or_subdomain(&host, d)) {
            return Err(block(BlockReason::HostNotInAllowlist { host }));
        }
    }

    if let Some(policy) = &rules.egress_policy {
        if !policy.allows(&host) {
            return Err(block(BlockReason::HostNotInAllowlist { host }));
        }
    }

    let port = url.port_or_known_default().unwrap_or(80);
    Ok((host, port))
}

/// Validates a parsed URL against the full rule set
///
/// Performs at most one DNS lookup through `resolver` (none for IP
/// literals). Every distinct answer is classified and a single forbidden
/// address fails the whole destination, since the caller cannot know which
/// answer a later connection would pick.
///
/// # Arguments
///
/// * `url` - The destination to check
/// * `rules` - Schemes, allowlists and trusted endpoints
/// * `resolver` - Where host names are resolved
///
/// # Returns
///
/// * `Ok(ValidatedDestination)` - The destination and its allowed addresses
/// * `Err(NetworkShieldError)` - The first rule that rejected it
pub async fn validate_destination(
    url: &Url,
    rules: &DestinationRules,
    resolver: &dyn Resolver,
) -> Result<ValidatedDestination, NetworkShieldError> {
    let (host, port) = check_static_rules(url, rules)?;

    let (candidates, is_ip_literal) = match url.host() {
        Some(Host::Ipv4(ip)) => (vec![IpAddr::V4(ip)], true),
        Some(Host::Ipv6(ip)) => (vec![IpAddr::V6(ip)], true),
        _ => {
            let answer = resolver.resolve(&host, port).await.map_err(|e| {
                NetworkShieldError::new(
                    url.as_str(),
                    BlockReason::DnsResolutionFailed {
                        host: host.clone(),
                        detail: e.to_string(),
                    },
                )
            })?;
            (answer, false)
        }
    };

    let mut addrs: Vec<IpAddr> = Vec::with_capacity(candidates.len());
    for ip in candidates.into_iter().map(canonical_ip) {
        if !addrs.contains(&ip) {
            addrs.push(ip);
        }
    }

    if addrs.is_empty() {
        return Err(NetworkShieldError::new(
            url.as_str(),
            BlockReason::DnsResolutionFailed {
                host,
                detail: "no addresses returned".to_string(),
            },
        ));
    }

    for ip in &addrs {
        if rules.is_trusted(*ip, port) {
            continue;
        }
        if let Some(category) = classify_ip(*ip) {
            tracing::debug!("Destination {} resolved to blocked address {}", host, ip);
            return Err(NetworkShieldError::new(
                url.as_str(),
                BlockReason::BlockedIp { ip: *ip, category },
            ));
        }
    }

    Ok(ValidatedDestination {
        url: url.clone(),
        host,
        port,
        addrs,
        is_ip_literal,
    })
}

/// Validates a raw URL using the system resolver
///
/// This is the one-shot entry point for callers that only need a verdict.
///
/// # Examples
///
/// ```no_run
/// use network_shield::destination::{validate_url_destination, DestinationRules};
///
/// # async fn example() {
/// let rules = DestinationRules::default();
/// let err = validate_url_destination("http://169.254.169.254/latest/meta-data", &rules)
///     .await
///     .unwrap_err();
/// assert_eq!(err.reason.code(), "blocked_ip");
/// # }
/// ```
pub async fn validate_url_destination(
    url: &str,
    rules: &DestinationRules,
) -> Result<(), NetworkShieldError> {
    let parsed = parse_destination(url)?;
    validate_destination(&parsed, rules, &SystemResolver).await?;
    Ok(())
}
