//! Safe fetcher
//!
//! One logical "get text for a URL" operation. Every hop of the redirect
//! chain is validated before it is contacted, the connection is pinned to
//! the address that was validated, and the body is streamed under a hard
//! byte cap.

mod body;
mod fetcher;

pub use fetcher::SafeFetcher;

use crate::config::{FetchConfig, UserAgentConfig};
use crate::destination::{DestinationRules, SystemResolver};
use crate::ShieldError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Per-call limits and headers for a safe fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Extra request headers, sent on every hop
    pub headers: Vec<(String, String)>,

    /// Upper bound on one attempt, covering DNS, connect and read for every hop
    pub timeout: Duration,

    /// Largest body that will be accepted
    pub max_bytes: usize,

    /// Number of redirects that may be followed (0 disables redirects)
    pub max_redirects: u32,

    /// Destination rules applied to the first URL and every hop
    pub rules: DestinationRules,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl FetchRequest {
    /// Builds a request from the `[fetch]` config section
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            headers: Vec::new(),
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
            max_redirects: config.max_redirects,
            rules: DestinationRules::default().with_allow_schemes(config.allow_schemes.clone()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_rules(mut self, rules: DestinationRules) -> Self {
        self.rules = rules;
        self
    }
}

/// A fully validated, within-budget response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeGetResult {
    /// Decoded body
    pub text: String,

    /// Status of the final response
    pub status_code: u16,

    /// URL of the final response after redirects
    pub final_url: String,

    /// Body size in bytes before decoding
    pub bytes_len: usize,
}

/// Fetches a URL with the system resolver and the default user agent
///
/// # Examples
///
/// ```no_run
/// use network_shield::{safe_get_text, FetchRequest};
///
/// # async fn example() -> network_shield::Result<()> {
/// let request = FetchRequest::default().with_max_bytes(64 * 1024);
/// let page = safe_get_text("https://example.com/careers", &request).await?;
/// println!("{} bytes from {}", page.bytes_len, page.final_url);
/// # Ok(())
/// # }
/// ```
pub async fn safe_get_text(url: &str, request: &FetchRequest) -> Result<SafeGetResult, ShieldError> {
    let fetcher = SafeFetcher::new(
        Arc::new(SystemResolver),
        UserAgentConfig::default().header_value(),
    );
    fetcher.get_text(url, request).await
}
