//! Provenance recording
//!
//! Every attempt the retry orchestrator makes is appended here, keyed by
//! provider. At the end of a run the whole map is written out as one JSON
//! object so an audit can see what was fetched, under which policy, and why
//! each attempt ended the way it did.

use crate::policy::{PolicySnapshot, ScrapeMode};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// 2xx response
    Success,

    /// Failed in a way that was (or would have been) retried
    Retryable,

    /// Failed with a status or error that is not retried
    Failed,

    /// Rejected by a security rule
    Blocked,

    /// Refused by the circuit breaker without a request
    CircuitOpen,
}

/// One attempt against a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub host: String,

    /// 1-based and monotonic per provider across the whole run
    pub attempt_number: u32,

    pub outcome: AttemptOutcome,
    pub reason: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    pub sleep_before_next_s: f64,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Creates a record; the recorder assigns the attempt number
    pub fn new(host: impl Into<String>, outcome: AttemptOutcome, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            attempt_number: 0,
            outcome,
            reason: reason.into(),
            status: None,
            sleep_before_next_s: 0.0,
            at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub fn with_sleep(mut self, sleep_s: f64) -> Self {
        self.sleep_before_next_s = sleep_s;
        self
    }
}

/// Policy in force for a provider, plus the config file it came with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRecord {
    #[serde(flatten)]
    pub policy: PolicySnapshot,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// Everything recorded for one provider during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderProvenance {
    pub attempts_made: u32,
    pub live_attempted: bool,
    pub mode: ScrapeMode,
    pub policy_snapshot: Option<PolicyRecord>,
    pub robots_final_allowed: Option<bool>,
    pub attempts: Vec<AttemptRecord>,
    pub fallback_triggered: bool,
    pub fallback_reason: Option<String>,
}

impl ProviderProvenance {
    fn new(mode: ScrapeMode) -> Self {
        Self {
            attempts_made: 0,
            live_attempted: false,
            mode,
            policy_snapshot: None,
            robots_final_allowed: None,
            attempts: Vec::new(),
            fallback_triggered: false,
            fallback_reason: None,
        }
    }
}

/// Run-wide provenance keyed by provider
#[derive(Debug, Default)]
pub struct ProvenanceRecorder {
    providers: Mutex<BTreeMap<String, ProviderProvenance>>,
}

impl ProvenanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider with the mode and policy it runs under
    ///
    /// Calling this again for the same provider updates the mode and keeps
    /// the attempts recorded so far.
    pub fn begin(&self, provider: &str, mode: ScrapeMode, policy: PolicyRecord) {
        let mut providers = self.providers.lock();
        let entry = providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderProvenance::new(mode));
        entry.mode = mode;
        entry.policy_snapshot = Some(policy);
    }

    /// Appends an attempt and returns its number
    pub fn record_attempt(&self, provider: &str, mode: ScrapeMode, mut record: AttemptRecord) -> u32 {
        let mut providers = self.providers.lock();
        let entry = providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderProvenance::new(mode));

        entry.attempts_made += 1;
        record.attempt_number = entry.attempts_made;
        entry.attempts.push(record);
        entry.attempts_made
    }

    /// Marks that a request for the provider is about to leave the process
    pub fn mark_live_attempted(&self, provider: &str, mode: ScrapeMode) {
        self.providers
            .lock()
            .entry(provider.to_string())
            .or_insert_with(|| ProviderProvenance::new(mode))
            .live_attempted = true;
    }

    /// Records the robots decision for the provider's latest attempt
    pub fn set_robots(&self, provider: &str, mode: ScrapeMode, allowed: bool) {
        self.providers
            .lock()
            .entry(provider.to_string())
            .or_insert_with(|| ProviderProvenance::new(mode))
            .robots_final_allowed = Some(allowed);
    }

    /// Marks that the provider's data came from the snapshot fallback
    pub fn record_fallback(&self, provider: &str, mode: ScrapeMode, reason: impl Into<String>) {
        let mut providers = self.providers.lock();
        let entry = providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderProvenance::new(mode));
        entry.fallback_triggered = true;
        entry.fallback_reason = Some(reason.into());
    }

    pub fn provider(&self, provider: &str) -> Option<ProviderProvenance> {
        self.providers.lock().get(provider).cloned()
    }

    /// The whole run as a JSON object keyed by provider
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.providers.lock()).unwrap_or(serde_json::Value::Null)
    }

    /// Writes the run summary to `path` as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let value = self.to_json();
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        tracing::info!("Wrote provenance for {} providers to {}", self.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.providers.lock().clear();
    }
}
