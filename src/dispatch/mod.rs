//! Mode dispatch between live fetching and snapshot data
//!
//! | Mode     | Live called | On live error                          |
//! |----------|-------------|----------------------------------------|
//! | snapshot | never       | n/a                                    |
//! | live     | yes         | propagated                             |
//! | auto     | yes         | transient: snapshot; security: propagated |
//!
//! A security rejection is never masked by snapshot data, in any mode.

use crate::policy::ScrapeMode;
use crate::ShieldError;
use std::future::Future;
use thiserror::Error;

/// The value a dispatch produced and how it got it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome<T> {
    pub value: T,
    pub live_attempted: bool,
    pub fallback_triggered: bool,

    /// Names the error kind that triggered the fallback
    pub fallback_reason: Option<String>,
}

/// Why a dispatch produced no value
#[derive(Debug, Error)]
pub enum DispatchError<E>
where
    E: std::error::Error + 'static,
{
    /// The live path failed and no fallback was allowed
    #[error(transparent)]
    Live(ShieldError),

    /// The snapshot loader failed
    #[error("snapshot load failed: {0}")]
    Snapshot(#[source] E),
}

impl<E> DispatchError<E>
where
    E: std::error::Error + 'static,
{
    pub fn as_live(&self) -> Option<&ShieldError> {
        match self {
            Self::Live(e) => Some(e),
            Self::Snapshot(_) => None,
        }
    }
}

/// Runs the live path, the snapshot path, or live with snapshot fallback
///
/// `live` is only invoked in `live` and `auto` mode, so snapshot mode never
/// builds a request.
///
/// # Arguments
///
/// * `mode` - Effective scrape mode for the run
/// * `live` - Produces the live fetch future
/// * `snapshot` - Loads the stored snapshot
///
/// # Examples
///
/// ```
/// use network_shield::dispatch::run_with_fallback;
/// use network_shield::{ScrapeMode, TransientError};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let outcome = run_with_fallback(
///     ScrapeMode::Auto,
///     || async {
///         Err(TransientError::Timeout { url: "https://example.com/".into() }.into())
///     },
///     || Ok::<_, std::io::Error>("cached".to_string()),
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(outcome.value, "cached");
/// assert!(outcome.fallback_triggered);
/// assert!(outcome.fallback_reason.unwrap().contains("TimeoutError"));
/// # });
/// ```
pub async fn run_with_fallback<T, E, L, Fut, S>(
    mode: ScrapeMode,
    live: L,
    snapshot: S,
) -> Result<DispatchOutcome<T>, DispatchError<E>>
where
    E: std::error::Error + 'static,
    L: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ShieldError>>,
    S: FnOnce() -> Result<T, E>,
{
    let from_snapshot = |snapshot: S, reason: Option<String>, live_attempted: bool| {
        snapshot()
            .map(|value| DispatchOutcome {
                value,
                live_attempted,
                fallback_triggered: reason.is_some(),
                fallback_reason: reason,
            })
            .map_err(DispatchError::Snapshot)
    };

    if mode == ScrapeMode::Snapshot {
        return from_snapshot(snapshot, None, false);
    }

    match live().await {
        Ok(value) => Ok(DispatchOutcome {
            value,
            live_attempted: true,
            fallback_triggered: false,
            fallback_reason: None,
        }),
        Err(ShieldError::Transient(e)) if mode == ScrapeMode::Auto => {
            let reason = format!("{}: {}", e.kind_name(), e);
            tracing::warn!("Live fetch failed, using snapshot: {}", reason);
            from_snapshot(snapshot, Some(reason), true)
        }
        Err(e) => Err(DispatchError::Live(e)),
    }
}
