use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the network shield
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the fetcher
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the fetcher
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the fetcher
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for operator contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "NetworkShield".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// The product token matched against robots.txt groups
    pub fn robots_token(&self) -> &str {
        &self.crawler_name
    }
}

/// Limits applied to a single fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt timeout in seconds, in (0, 120]
    #[serde(rename = "timeout-s")]
    pub timeout_s: f64,

    /// Maximum response body size in bytes
    #[serde(rename = "max-bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirect hops
    #[serde(rename = "max-redirects")]
    pub max_redirects: u32,

    /// URL schemes that may be fetched
    #[serde(rename = "allow-schemes")]
    pub allow_schemes: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_s: 20.0,
            max_bytes: 2_000_000,
            max_redirects: 5,
            allow_schemes: vec!["http".to_string(), "https".to_string()],
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s)
    }
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per logical fetch, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base backoff in seconds (doubled per attempt)
    #[serde(rename = "backoff-base-s")]
    pub backoff_base_s: f64,

    /// Backoff ceiling in seconds
    #[serde(rename = "backoff-max-s")]
    pub backoff_max_s: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_s: 1.0,
            backoff_max_s: 30.0,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// How long an open breaker rejects attempts, in seconds
    #[serde(rename = "cooldown-s")]
    pub cooldown_s: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_s: 600.0,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_s)
    }
}

/// Politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-host-interval-ms")]
    pub min_host_interval_ms: u64,

    /// Whether robots.txt is fetched and checked
    #[serde(rename = "check-robots")]
    pub check_robots: bool,

    /// Byte cap for robots.txt bodies
    #[serde(rename = "robots-max-bytes")]
    pub robots_max_bytes: usize,

    /// Timeout for robots.txt fetches in seconds
    #[serde(rename = "robots-timeout-s")]
    pub robots_timeout_s: f64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_host_interval_ms: 1000,
            check_robots: true,
            robots_max_bytes: 512_000,
            robots_timeout_s: 10.0,
        }
    }
}

impl PolitenessConfig {
    pub fn min_host_interval(&self) -> Duration {
        Duration::from_millis(self.min_host_interval_ms)
    }

    pub fn robots_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.robots_timeout_s)
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the per-run provenance JSON is written, if anywhere
    #[serde(rename = "provenance-path")]
    pub provenance_path: Option<String>,
}
