//! Network Shield: the safe outbound-fetch subsystem
//!
//! This crate is the only code path that talks to operator-supplied URLs. It
//! validates every destination (and every redirect hop) against SSRF rules,
//! pins connections to the address it validated, caps response bodies,
//! applies an egress allowlist, backs off from failing hosts and records
//! provenance for each attempt.

pub mod breaker;
pub mod config;
pub mod destination;
pub mod dispatch;
pub mod fetch;
pub mod policy;
pub mod politeness;
pub mod provenance;
pub mod retry;
pub mod robots;
pub mod state;
pub mod url;

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for every fetch operation
///
/// There are exactly two families. `Security` is a policy rejection and must
/// never be retried or masked by a fallback path; `Transient` covers network
/// trouble and upstream failures that callers may retry or fall back from.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error(transparent)]
    Security(#[from] NetworkShieldError),

    #[error(transparent)]
    Transient(#[from] TransientError),
}

impl ShieldError {
    /// Stable reason code for logs and provenance records
    pub fn reason_code(&self) -> String {
        match self {
            Self::Security(e) => e.reason.code().to_string(),
            Self::Transient(e) => e.reason_code(),
        }
    }

    /// Name of the concrete error kind, e.g. `Transport` or `BlockedIp`
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Security(e) => e.reason.kind_name(),
            Self::Transient(e) => e.kind_name(),
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// Returns the security rejection, if this is one
    pub fn as_security(&self) -> Option<&NetworkShieldError> {
        match self {
            Self::Security(e) => Some(e),
            Self::Transient(_) => None,
        }
    }
}

/// A destination was rejected by policy
///
/// Raised by the destination validator, the allowlist policy and the safe
/// fetcher's limits. Always fatal for the current fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[network_shield] blocked {reason} url={url}")]
pub struct NetworkShieldError {
    /// The URL (or redirect hop) that was rejected
    pub url: String,

    /// Why it was rejected
    pub reason: BlockReason,
}

impl NetworkShieldError {
    pub fn new(url: impl Into<String>, reason: BlockReason) -> Self {
        Self {
            url: url.into(),
            reason,
        }
    }
}

/// Why a destination was blocked
///
/// Every rejection carries exactly one reason. `code()` gives the stable
/// snake_case token used in log lines and provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The URL scheme is not in the allowed set
    SchemeNotAllowed { scheme: String },

    /// The URL embeds `user:pass@`
    CredentialsInUrl,

    /// The URL has no host
    HostMissing,

    /// The host is literally `localhost`
    HostIsLocalhost,

    /// The host is not covered by the host, domain or egress allowlist
    HostNotInAllowlist { host: String },

    /// The host is, or resolves to, a forbidden address
    BlockedIp { ip: IpAddr, category: IpCategory },

    /// DNS lookup failed or returned no records
    DnsResolutionFailed { host: String, detail: String },

    /// The redirect chain is longer than allowed
    MaxRedirectsExceeded { max: u32 },

    /// A redirect's `Location` is not a usable URL
    InvalidRedirect { location: String },

    /// The response body is larger than allowed
    MaxBytesExceeded { max: usize },
}

impl BlockReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemeNotAllowed { .. } => "scheme_not_allowed",
            Self::CredentialsInUrl => "credentials_in_url",
            Self::HostMissing => "host_missing",
            Self::HostIsLocalhost => "host_is_localhost",
            Self::HostNotInAllowlist { .. } => "host_not_in_allowlist",
            Self::BlockedIp { .. } => "blocked_ip",
            Self::DnsResolutionFailed { .. } => "dns_resolution_failed",
            Self::MaxRedirectsExceeded { .. } => "max_redirects_exceeded",
            Self::InvalidRedirect { .. } => "invalid_redirect",
            Self::MaxBytesExceeded { .. } => "max_bytes_exceeded",
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::SchemeNotAllowed { .. } => "SchemeNotAllowed",
            Self::CredentialsInUrl => "CredentialsInUrl",
            Self::HostMissing => "HostMissing",
            Self::HostIsLocalhost => "HostIsLocalhost",
            Self::HostNotInAllowlist { .. } => "HostNotInAllowlist",
            Self::BlockedIp { .. } => "BlockedIp",
            Self::DnsResolutionFailed { .. } => "DnsResolutionFailed",
            Self::MaxRedirectsExceeded { .. } => "MaxRedirectsExceeded",
            Self::InvalidRedirect { .. } => "InvalidRedirect",
            Self::MaxBytesExceeded { .. } => "MaxBytesExceeded",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemeNotAllowed { scheme } => {
                write!(f, "{} scheme={}", self.code(), scheme)
            }
            Self::HostNotInAllowlist { host } => write!(f, "{} host={}", self.code(), host),
            Self::BlockedIp { ip, category } => {
                write!(f, "{} ip={} category={}", self.code(), ip, category.code())
            }
            Self::DnsResolutionFailed { host, detail } => {
                write!(f, "{} host={} detail={}", self.code(), host, detail)
            }
            Self::MaxRedirectsExceeded { max } => write!(f, "{} max={}", self.code(), max),
            Self::InvalidRedirect { location } => {
                write!(f, "{} location={}", self.code(), location)
            }
            Self::MaxBytesExceeded { max } => write!(f, "{} max={}", self.code(), max),
            _ => f.write_str(self.code()),
        }
    }
}

/// Address classes that are never reachable through the shield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IpCategory {
    Loopback,
    Private,
    LinkLocal,
    Multicast,
    Reserved,
    Unspecified,
    SiteLocal,
}

impl IpCategory {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::Private => "private",
            Self::LinkLocal => "link_local",
            Self::Multicast => "multicast",
            Self::Reserved => "reserved",
            Self::Unspecified => "unspecified",
            Self::SiteLocal => "site_local",
        }
    }
}

/// Failures that say nothing about the safety of the destination
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("circuit breaker open for {host}, retry in {retry_in:?}")]
    CircuitOpen { host: String, retry_in: Duration },

    #[error("live fetching is disabled in {mode} mode")]
    LiveDisabled { mode: policy::ScrapeMode },
}

impl TransientError {
    /// Whether the retry orchestrator should try again
    ///
    /// Transport failures, timeouts, 5xx and 429 are retryable. An open
    /// breaker and snapshot mode are not: retrying would not change anything
    /// within the same call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            Self::CircuitOpen { .. } | Self::LiveDisabled { .. } => false,
        }
    }

    /// Stable reason code: `network_error`, the status code, `circuit_open`
    /// or `snapshot_mode`
    pub fn reason_code(&self) -> String {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => "network_error".to_string(),
            Self::HttpStatus { status, .. } => status.to_string(),
            Self::CircuitOpen { .. } => "circuit_open".to_string(),
            Self::LiveDisabled { .. } => "snapshot_mode".to_string(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TransportError",
            Self::Timeout { .. } => "TimeoutError",
            Self::HttpStatus { .. } => "HttpStatusError",
            Self::CircuitOpen { .. } => "CircuitOpenError",
            Self::LiveDisabled { .. } => "LiveDisabledError",
        }
    }

    /// HTTP status attached to this failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Wraps a reqwest failure, separating timeouts from other transport errors
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid scrape mode: {0}")]
    InvalidMode(String),
}

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, ShieldError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use destination::{validate_url_destination, DestinationRules, Resolver};
pub use fetch::{safe_get_text, FetchRequest, SafeFetcher, SafeGetResult};
pub use policy::{AllowlistPolicy, PolicyDecision, ScrapeMode};
pub use retry::{FetchMeta, NetworkShield, RetrySettings};
