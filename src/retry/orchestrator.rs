use super::RetrySettings;
use crate::breaker::CircuitBreaker;
use crate::config::Config;
use crate::destination::{parse_destination, DestinationRules, Resolver, SystemResolver};
use crate::dispatch::{run_with_fallback, DispatchError, DispatchOutcome};
use crate::fetch::{FetchRequest, SafeFetcher};
use crate::policy::{AllowlistPolicy, PolicyDecision, ScrapeMode};
use crate::politeness::PolitenessController;
use crate::provenance::{AttemptOutcome, AttemptRecord, PolicyRecord, ProvenanceRecorder};
use crate::url::extract_host;
use crate::{BlockReason, NetworkShieldError, ShieldError, TransientError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// What a successful fetch went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchMeta {
    pub provider: String,
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub bytes_len: usize,

    /// Attempt number of the successful attempt within the run
    pub attempt_number: u32,

    pub mode: ScrapeMode,
    pub robots_allowed: bool,
}

/// Safe outbound fetching for a whole run
///
/// Breaker and politeness state live here for as long as the shield does;
/// create one per run and share it by reference between tasks.
#[derive(Debug)]
pub struct NetworkShield {
    config: Config,
    policy: AllowlistPolicy,
    rules: DestinationRules,
    fetcher: SafeFetcher,
    breaker: CircuitBreaker,
    politeness: PolitenessController,
    recorder: ProvenanceRecorder,
    config_hash: Option<String>,
}

impl NetworkShield {
    /// Creates a shield that resolves through the operating system
    ///
    /// # Example
    ///
    /// ```no_run
    /// use network_shield::{AllowlistPolicy, Config, NetworkShield, RetrySettings};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let policy = AllowlistPolicy::from_env()?;
    /// let shield = NetworkShield::new(Config::default(), policy);
    ///
    /// let (text, meta) = shield
    ///     .fetch_text_with_retry("acme", "https://boards.example.com/acme", &RetrySettings::default())
    ///     .await?;
    /// println!("{} bytes after {} attempts", text.len(), meta.attempt_number);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config, policy: AllowlistPolicy) -> Self {
        Self::with_resolver(
            config,
            policy,
            Arc::new(SystemResolver),
            DestinationRules::default(),
        )
    }

    /// Creates a shield with an explicit resolver and base rules
    ///
    /// The allowed schemes come from `config`, and `policy` is attached as
    /// the egress policy so every redirect hop is checked against it.
    pub fn with_resolver(
        config: Config,
        policy: AllowlistPolicy,
        resolver: Arc<dyn Resolver>,
        rules: DestinationRules,
    ) -> Self {
        let rules = rules
            .with_allow_schemes(config.fetch.allow_schemes.clone())
            .with_egress_policy(policy.clone());

        let fetcher = SafeFetcher::new(resolver, config.user_agent.header_value());
        let politeness = PolitenessController::new(
            fetcher.clone(),
            &config.politeness,
            config.user_agent.robots_token(),
        )
        .with_rules(rules.clone());
        let breaker = CircuitBreaker::from_config(&config.breaker);

        Self {
            config,
            policy,
            rules,
            fetcher,
            breaker,
            politeness,
            recorder: ProvenanceRecorder::new(),
            config_hash: None,
        }
    }

    /// Attaches the config file hash recorded with each policy snapshot
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &AllowlistPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn politeness(&self) -> &PolitenessController {
        &self.politeness
    }

    pub fn recorder(&self) -> &ProvenanceRecorder {
        &self.recorder
    }

    /// Evaluates `url` against the egress policy without fetching
    pub fn evaluate_allowlist_policy(&self, url: &str) -> PolicyDecision {
        self.policy.evaluate(url)
    }

    /// Clears breaker and politeness state for every host
    pub fn reset_politeness_state(&self) {
        self.breaker.reset_all();
        self.politeness.reset();
    }

    /// Fetches `url` for `provider`, retrying transient failures
    ///
    /// # Attempt Flow
    ///
    /// 1. Snapshot mode: fail with `LiveDisabled`, no network at all
    /// 2. Host not allowed by the egress policy: security error, before DNS
    /// 3. Breaker open: `CircuitOpen`, no request
    /// 4. robots.txt and host spacing (logged, never fatal)
    /// 5. Safe fetch
    ///
    /// | Result | Action |
    /// |--------|--------|
    /// | 2xx | Breaker success, return |
    /// | Security error | Return immediately |
    /// | Transport, timeout, 5xx, 429 | Breaker failure, back off, retry |
    /// | Other status | Return immediately as `HttpStatus` |
    ///
    /// When attempts run out, or the breaker trips, the last error is
    /// returned.
    pub async fn fetch_text_with_retry(
        &self,
        provider: &str,
        url: &str,
        settings: &RetrySettings,
    ) -> Result<(String, FetchMeta), ShieldError> {
        let mode = self.policy.effective_mode();
        self.recorder.begin(provider, mode, self.policy_record());

        if !mode.is_networked() {
            return Err(TransientError::LiveDisabled { mode }.into());
        }

        let parsed = match parse_destination(url) {
            Ok(parsed) => parsed,
            Err(e) => return Err(self.blocked(provider, mode, "", e)),
        };
        let Some(host) = extract_host(&parsed) else {
            let e = NetworkShieldError::new(url, BlockReason::HostMissing);
            return Err(self.blocked(provider, mode, "", e));
        };
        if !self.policy.allows(&host) {
            let e = NetworkShieldError::new(
                url,
                BlockReason::HostNotInAllowlist { host: host.clone() },
            );
            return Err(self.blocked(provider, mode, &host, e));
        }

        let request = FetchRequest::from_config(&self.config.fetch).with_rules(self.rules.clone());
        let max_attempts = settings.max_attempts.max(1);
        let mut attempt_index: u32 = 0;

        loop {
            // Dropping the permit (including by cancelling this future) frees a
            // half-open probe that never got an outcome
            let permit = match self.breaker.try_acquire(&host, Instant::now()) {
                Ok(permit) => permit,
                Err(retry_in) => {
                    self.recorder.record_attempt(
                        provider,
                        mode,
                        AttemptRecord::new(&host, AttemptOutcome::CircuitOpen, "circuit_open"),
                    );
                    return Err(TransientError::CircuitOpen { host, retry_in }.into());
                }
            };

            self.recorder.mark_live_attempted(provider, mode);

            let robots_allowed = self.politeness.check_robots(provider, &parsed).await;
            self.recorder.set_robots(provider, mode, robots_allowed);
            if !robots_allowed {
                tracing::info!("robots.txt disallows {} for {}, fetching anyway", url, provider);
            }

            let wait = self.politeness.wait_before(&host);
            if !wait.is_zero() {
                tracing::debug!("Waiting {:?} before next request to {}", wait, host);
                tokio::time::sleep(wait).await;
            }
            self.politeness.note_attempt(&host);

            let err = match self.fetcher.get_text(url, &request).await {
                Ok(result) if (200..300).contains(&result.status_code) => {
                    permit.record_success();
                    let attempt_number = self.recorder.record_attempt(
                        provider,
                        mode,
                        AttemptRecord::new(&host, AttemptOutcome::Success, "ok")
                            .with_status(Some(result.status_code)),
                    );

                    let meta = FetchMeta {
                        provider: provider.to_string(),
                        url: url.to_string(),
                        final_url: result.final_url,
                        status_code: result.status_code,
                        bytes_len: result.bytes_len,
                        attempt_number,
                        mode,
                        robots_allowed,
                    };
                    return Ok((result.text, meta));
                }
                Ok(result) => TransientError::HttpStatus {
                    url: result.final_url,
                    status: result.status_code,
                },
                Err(ShieldError::Security(e)) => {
                    permit.release();
                    return Err(self.blocked(provider, mode, &host, e));
                }
                Err(ShieldError::Transient(e)) => e,
            };

            if !err.is_retryable() {
                // A non-retryable status still proves the host is up
                if err.status().is_some() {
                    permit.record_success();
                } else {
                    permit.release();
                }
                self.recorder.record_attempt(
                    provider,
                    mode,
                    AttemptRecord::new(&host, AttemptOutcome::Failed, err.reason_code())
                        .with_status(err.status()),
                );
                return Err(err.into());
            }

            let tripped = permit.record_failure();
            if tripped {
                tracing::warn!(
                    target: "network_shield",
                    "[network_shield] circuit_breaker provider={} failures={} cooldown_s={:.1}",
                    provider,
                    self.breaker.consecutive_failures(&host),
                    self.breaker.cooldown().as_secs_f64()
                );
            }

            let record = AttemptRecord::new(&host, AttemptOutcome::Retryable, err.reason_code())
                .with_status(err.status());

            if tripped || attempt_index + 1 >= max_attempts {
                self.recorder.record_attempt(provider, mode, record);
                return Err(err.into());
            }

            let delay = settings.backoff_delay(attempt_index);
            self.recorder
                .record_attempt(provider, mode, record.with_sleep(delay.as_secs_f64()));

            tracing::warn!(
                target: "network_shield",
                "[network_shield] backoff provider={} attempt={} sleep_s={:.2} reason={} status={}",
                provider,
                attempt_index + 1,
                delay.as_secs_f64(),
                err.reason_code(),
                err.status()
                    .map(|status| status.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );

            tokio::time::sleep(delay).await;
            attempt_index += 1;
        }
    }

    /// Fetches live or loads the snapshot, depending on the mode
    ///
    /// In `auto` mode a transient live failure falls back to `snapshot` and
    /// the fallback is recorded in provenance. Security errors are never
    /// masked.
    pub async fn fetch_or_snapshot<E, S>(
        &self,
        provider: &str,
        url: &str,
        settings: &RetrySettings,
        snapshot: S,
    ) -> Result<DispatchOutcome<String>, DispatchError<E>>
    where
        E: std::error::Error + 'static,
        S: FnOnce() -> Result<String, E>,
    {
        let mode = self.policy.effective_mode();
        self.recorder.begin(provider, mode, self.policy_record());

        let outcome = run_with_fallback(
            mode,
            || async {
                self.fetch_text_with_retry(provider, url, settings)
                    .await
                    .map(|(text, _)| text)
            },
            snapshot,
        )
        .await?;

        if let Some(reason) = &outcome.fallback_reason {
            self.recorder.record_fallback(provider, mode, reason.clone());
        }
        Ok(outcome)
    }

    /// Writes provenance to `[output] provenance-path`, when configured
    ///
    /// # Returns
    ///
    /// The path written, or `None` if no path is configured
    pub fn write_provenance(&self) -> std::io::Result<Option<PathBuf>> {
        let Some(path) = self.config.output.provenance_path.as_deref() else {
            return Ok(None);
        };
        let path = Path::new(path);
        self.recorder.write_json(path)?;
        Ok(Some(path.to_path_buf()))
    }

    fn policy_record(&self) -> PolicyRecord {
        PolicyRecord {
            policy: self.policy.snapshot(),
            config_hash: self.config_hash.clone(),
        }
    }

    fn blocked(
        &self,
        provider: &str,
        mode: ScrapeMode,
        host: &str,
        error: NetworkShieldError,
    ) -> ShieldError {
        tracing::warn!(target: "network_shield", "{}", error);
        self.recorder.record_attempt(
            provider,
            mode,
            AttemptRecord::new(host, AttemptOutcome::Blocked, error.reason.code()),
        );
        error.into()
    }
}
