//! Retry orchestration
//!
//! [`NetworkShield`] is the composition root: it owns the breaker and
//! politeness registries, the provenance recorder and the egress policy, and
//! drives each logical fetch through them.

mod backoff;
mod orchestrator;

pub use backoff::RetrySettings;
pub use orchestrator::{FetchMeta, NetworkShield};
