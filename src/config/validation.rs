use crate::config::types::{
    BreakerConfig, Config, FetchConfig, PolitenessConfig, RetryConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound for a single attempt's timeout
pub const MAX_TIMEOUT_S: f64 = 120.0;

/// Upper bound for any backoff sleep
pub const MAX_BACKOFF_S: f64 = 3_600.0;

/// Upper bound for the breaker cooldown (one day)
pub const MAX_COOLDOWN_S: f64 = 86_400.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_fetch_config(&config.fetch)?;
    validate_retry_config(&config.retry)?;
    validate_breaker_config(&config.breaker)?;
    validate_politeness_config(&config.politeness)?;
    Ok(())
}

/// Validates per-fetch limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if !(config.timeout_s > 0.0 && config.timeout_s <= MAX_TIMEOUT_S) {
        return Err(ConfigError::Validation(format!(
            "timeout_s must be in (0, {}], got {}",
            MAX_TIMEOUT_S, config.timeout_s
        )));
    }

    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_bytes must be greater than 0".to_string(),
        ));
    }

    if config.allow_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "allow_schemes cannot be empty".to_string(),
        ));
    }

    for scheme in &config.allow_schemes {
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            return Err(ConfigError::Validation(format!(
                "Invalid scheme in allow_schemes: '{}'",
                scheme
            )));
        }
    }

    Ok(())
}

/// Validates retry and backoff settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !(config.backoff_base_s >= 0.0 && config.backoff_base_s <= MAX_BACKOFF_S) {
        return Err(ConfigError::Validation(format!(
            "backoff_base_s must be in [0, {}], got {}",
            MAX_BACKOFF_S, config.backoff_base_s
        )));
    }

    if !(config.backoff_max_s >= config.backoff_base_s && config.backoff_max_s <= MAX_BACKOFF_S) {
        return Err(ConfigError::Validation(format!(
            "backoff_max_s must be in [backoff_base_s ({}), {}], got {}",
            config.backoff_base_s, MAX_BACKOFF_S, config.backoff_max_s
        )));
    }

    Ok(())
}

/// Validates circuit breaker settings
fn validate_breaker_config(config: &BreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "failure_threshold must be >= 1, got {}",
            config.failure_threshold
        )));
    }

    if !(config.cooldown_s >= 0.0 && config.cooldown_s <= MAX_COOLDOWN_S) {
        return Err(ConfigError::Validation(format!(
            "cooldown_s must be in [0, {}], got {}",
            MAX_COOLDOWN_S, config.cooldown_s
        )));
    }

    Ok(())
}

/// Validates politeness settings
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.robots_max_bytes == 0 {
        return Err(ConfigError::Validation(
            "robots_max_bytes must be greater than 0".to_string(),
        ));
    }

    if !(config.robots_timeout_s > 0.0 && config.robots_timeout_s <= MAX_TIMEOUT_S) {
        return Err(ConfigError::Validation(format!(
            "robots_timeout_s must be in (0, {}], got {}",
            MAX_TIMEOUT_S, config.robots_timeout_s
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::Validation(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates an allowlist pattern
///
/// Accepted forms are `example.com`, `.example.com` and `*.example.com`.
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
        .unwrap_or(pattern);

    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // A bare label would let "*.com" style entries open a whole TLD
    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
