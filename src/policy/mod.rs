//! Egress allowlist policy
//!
//! Decides whether a host may be contacted at all for this run. The policy
//! is built once per process (usually from the environment) and passed to
//! whoever needs it; it is never re-read while a fetch is in progress.
//!
//! In `live` and `auto` mode the policy is fail-closed: an empty allowlist
//! rejects every host, so a missing variable cannot open unrestricted
//! egress. A `*` entry (or `allow_all`) disables the check and is meant for
//! controlled test and development setups only.

mod mode;

pub use mode::ScrapeMode;

use crate::config::validate_domain_pattern;
use crate::url::{extract_host, matches_domain_pattern, normalize_host};
use crate::ConfigError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Environment variable holding the scrape mode
pub const MODE_ENV: &str = "SCRAPE_MODE";

/// Environment variable holding the comma separated domain allowlist
pub const ALLOWED_DOMAINS_ENV: &str = "SCRAPE_ALLOWED_DOMAINS";

/// Which hosts a run may reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistPolicy {
    mode: ScrapeMode,
    allowed_domains: Vec<String>,
    allow_all: bool,
}

/// Outcome of evaluating a URL against the policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    /// Whether the URL may be fetched
    pub final_allowed: bool,

    /// Short machine-readable reason
    pub reason: String,

    /// Mode the decision was made in
    pub mode: ScrapeMode,

    /// Host the decision applies to, when one could be extracted
    pub host: Option<String>,
}

/// Serializable view of the policy for provenance records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySnapshot {
    pub mode: ScrapeMode,
    pub allowed_domains: Vec<String>,
    pub allow_all: bool,
    /// SHA-256 over mode, allow-all flag and sorted domains
    pub digest: String,
}

impl AllowlistPolicy {
    /// Creates a policy
    ///
    /// Entries are trimmed and lowercased; empty entries are dropped and a
    /// bare `*` turns on `allow_all`.
    pub fn new<I, S>(mode: ScrapeMode, domains: I, allow_all: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allow_all = allow_all;
        let mut allowed_domains = Vec::new();

        for entry in domains {
            let entry = entry.as_ref().trim().to_ascii_lowercase();
            if entry.is_empty() {
                continue;
            }
            if entry == "*" {
                allow_all = true;
                continue;
            }
            allowed_domains.push(entry);
        }

        allowed_domains.sort();
        allowed_domains.dedup();

        Self {
            mode,
            allowed_domains,
            allow_all,
        }
    }

    /// Builds a policy from raw mode and allowlist strings
    ///
    /// A missing mode means `snapshot`. The allowlist is split on commas and
    /// each entry must be an exact domain, `.domain`, `*.domain` or `*`.
    ///
    /// # Arguments
    ///
    /// * `mode` - Raw mode value (`snapshot`, `live` or `auto`)
    /// * `domains` - Raw comma separated allowlist
    ///
    /// # Returns
    ///
    /// * `Ok(AllowlistPolicy)` - The parsed policy
    /// * `Err(ConfigError)` - Unknown mode or malformed entry
    pub fn from_values(mode: Option<&str>, domains: Option<&str>) -> Result<Self, ConfigError> {
        let mode = match mode.map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => raw.parse()?,
            None => ScrapeMode::default(),
        };

        let entries = split_domains(domains.unwrap_or(""));
        for entry in &entries {
            if entry != "*" {
                validate_domain_pattern(entry)?;
            }
        }

        Ok(Self::new(mode, entries, false))
    }

    /// Reads `SCRAPE_MODE` and `SCRAPE_ALLOWED_DOMAINS` once
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = std::env::var(MODE_ENV).ok();
        let domains = std::env::var(ALLOWED_DOMAINS_ENV).ok();
        let policy = Self::from_values(mode.as_deref(), domains.as_deref())?;

        tracing::info!(
            "Egress policy: mode={} domains={} allow_all={}",
            policy.mode,
            policy.allowed_domains.len(),
            policy.allow_all
        );

        Ok(policy)
    }

    pub fn effective_mode(&self) -> ScrapeMode {
        self.mode
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn allow_all(&self) -> bool {
        self.allow_all
    }

    /// Checks a host against the allowlist, ignoring the mode
    ///
    /// Fails closed: with no entries and no allow-all every host is
    /// rejected.
    pub fn allows(&self, host: &str) -> bool {
        if self.allow_all {
            return true;
        }

        let host = normalize_host(host);
        self.allowed_domains
            .iter()
            .any(|pattern| matches_domain_pattern(pattern, &host))
    }

    /// Evaluates a URL for callers that need a pass/fail without fetching
    ///
    /// In snapshot mode nothing will be fetched, so the decision is always
    /// allowed with reason `snapshot_mode`.
    ///
    /// # Examples
    ///
    /// ```
    /// use network_shield::policy::{AllowlistPolicy, ScrapeMode};
    ///
    /// let policy = AllowlistPolicy::new(ScrapeMode::Live, Vec::<String>::new(), false);
    /// let decision = policy.evaluate("https://jobs.example.com/");
    /// assert!(!decision.final_allowed);
    /// assert_eq!(decision.reason, "empty_allowlist");
    /// ```
    pub fn evaluate(&self, url: &str) -> PolicyDecision {
        let host = Url::parse(url.trim()).ok().and_then(|u| extract_host(&u));
        let decide = |final_allowed: bool, reason: &str| PolicyDecision {
            final_allowed,
            reason: reason.to_string(),
            mode: self.mode,
            host: host.clone(),
        };

        if !self.mode.is_networked() {
            return decide(true, "snapshot_mode");
        }

        let Some(h) = host.as_deref() else {
            return decide(false, "host_missing");
        };

        if self.allow_all {
            decide(true, "allow_all")
        } else if self.allowed_domains.is_empty() {
            decide(false, "empty_allowlist")
        } else if self.allows(h) {
            decide(true, "allowlist_match")
        } else {
            decide(false, "host_not_in_allowlist")
        }
    }

    /// Serializable snapshot with a stable digest
    pub fn snapshot(&self) -> PolicySnapshot {
        let mut hasher = Sha256::new();
        hasher.update(self.mode.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update([u8::from(self.allow_all)]);
        for domain in &self.allowed_domains {
            hasher.update([0u8]);
            hasher.update(domain.as_bytes());
        }

        PolicySnapshot {
            mode: self.mode,
            allowed_domains: self.allowed_domains.clone(),
            allow_all: self.allow_all,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

/// Splits a comma separated allowlist into trimmed, non-empty entries
pub fn split_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}
