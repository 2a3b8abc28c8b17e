//! Configuration module for the network shield
//!
//! This module handles loading, parsing, and validating the TOML file that
//! sets fetch limits, retry/backoff, circuit breaker and politeness knobs.
//! Every section is optional and falls back to conservative defaults.
//!
//! The scrape mode and egress allowlist are deliberately not part of the
//! file; they come from the environment via
//! [`AllowlistPolicy::from_env`](crate::policy::AllowlistPolicy::from_env).
//!
//! # Example
//!
//! ```no_run
//! use network_shield::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("shield.toml")).unwrap();
//! println!("Max body size: {} bytes", config.fetch.max_bytes);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BreakerConfig, Config, FetchConfig, OutputConfig, PolitenessConfig, RetryConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_domain_pattern};
