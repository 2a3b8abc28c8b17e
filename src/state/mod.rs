//! Per-host state kept for the lifetime of a run
//!
//! # Components
//!
//! - `HostState`: request spacing and the cached robots.txt decision
//! - `BreakerState`: consecutive failures and cooldown for the circuit breaker
//!
//! Both are plain values; the registries in `politeness` and `breaker` own
//! them behind a lock.

mod breaker_state;
mod host_state;

pub use breaker_state::{BreakerPhase, BreakerState};
pub use host_state::HostState;
