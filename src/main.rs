//! network-shield command-line entry point
//!
//! Exposes the destination validator, the egress policy and the retrying
//! safe fetcher for manual checks and one-off fetches.

use clap::{Parser, Subcommand};
use network_shield::config::{load_config_with_hash, Config};
use network_shield::destination::validate_url_destination;
use network_shield::{AllowlistPolicy, DestinationRules, NetworkShield, RetrySettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// network-shield: safe outbound fetching for untrusted URLs
///
/// Every URL and redirect hop is checked against SSRF rules before it is
/// contacted. The scrape mode and egress allowlist are read from
/// SCRAPE_MODE and SCRAPE_ALLOWED_DOMAINS.
#[derive(Parser, Debug)]
#[command(name = "network-shield")]
#[command(version)]
#[command(about = "Safe outbound fetching for untrusted URLs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a URL may be contacted (resolves DNS, sends nothing)
    Validate {
        url: String,
    },

    /// Evaluate a URL against the egress allowlist policy
    Policy {
        url: String,
    },

    /// Fetch a URL through the retrying safe fetcher
    Fetch {
        url: String,

        /// Provider name used in logs and provenance
        #[arg(short, long, default_value = "cli")]
        provider: String,

        /// Print fetch metadata as JSON instead of the body
        #[arg(long)]
        meta: bool,

        /// Write provenance JSON here (overrides [output] provenance-path)
        #[arg(long, value_name = "PATH")]
        provenance: Option<PathBuf>,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = load(cli.config.as_ref())?;

    match cli.command {
        Command::Validate { url } => handle_validate(&config, &url).await,
        Command::Policy { url } => handle_policy(&url),
        Command::Fetch {
            url,
            provider,
            meta,
            provenance,
        } => handle_fetch(config, config_hash, &url, &provider, meta, provenance).await,
        Command::CheckConfig => handle_check_config(&config, config_hash.as_deref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("network_shield=info,warn"),
            1 => EnvFilter::new("network_shield=debug,info"),
            2 => EnvFilter::new("network_shield=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&PathBuf>) -> Result<(Config, Option<String>), Box<dyn std::error::Error>> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        return Ok((Config::default(), None));
    };

    tracing::info!("Loading configuration from: {}", path.display());
    match load_config_with_hash(path) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok((config, Some(hash)))
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

/// Handles `validate`: prints the verdict for one URL
async fn handle_validate(config: &Config, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rules = DestinationRules::default().with_allow_schemes(config.fetch.allow_schemes.clone());

    match validate_url_destination(url, &rules).await {
        Ok(()) => {
            println!("✓ allowed: {}", url);
            Ok(())
        }
        Err(e) => {
            println!("✗ {}", e);
            Err(e.into())
        }
    }
}

/// Handles `policy`: prints the allowlist decision as JSON
fn handle_policy(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let policy = AllowlistPolicy::from_env()?;
    let decision = policy.evaluate(url);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

/// Handles `fetch`: one retrying fetch, then provenance
async fn handle_fetch(
    mut config: Config,
    config_hash: Option<String>,
    url: &str,
    provider: &str,
    meta: bool,
    provenance: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = provenance {
        config.output.provenance_path = Some(path.display().to_string());
    }

    let settings = RetrySettings::from_config(&config.retry);
    let policy = AllowlistPolicy::from_env()?;
    let mut shield = NetworkShield::new(config, policy);
    if let Some(hash) = config_hash {
        shield = shield.with_config_hash(hash);
    }

    let result = shield.fetch_text_with_retry(provider, url, &settings).await;

    if let Some(path) = shield.write_provenance()? {
        tracing::info!("Provenance written to {}", path.display());
    }

    match result {
        Ok((text, fetch_meta)) => {
            if meta {
                println!("{}", serde_json::to_string_pretty(&fetch_meta)?);
            } else {
                println!("{}", text);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Fetch failed ({}): {}", e.reason_code(), e);
            Err(e.into())
        }
    }
}

/// Handles `check-config`: shows the effective settings
fn handle_check_config(
    config: &Config,
    config_hash: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== network-shield configuration ===\n");

    println!("User Agent:");
    println!("  Header: {}", config.user_agent.header_value());
    println!("  Robots token: {}", config.user_agent.robots_token());

    println!("\nFetch:");
    println!("  Timeout: {:?}", config.fetch.timeout());
    println!("  Max bytes: {}", config.fetch.max_bytes);
    println!("  Max redirects: {}", config.fetch.max_redirects);
    println!("  Schemes: {}", config.fetch.allow_schemes.join(", "));

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}s base, {}s max",
        config.retry.backoff_base_s, config.retry.backoff_max_s
    );

    println!("\nCircuit Breaker:");
    println!("  Failure threshold: {}", config.breaker.failure_threshold);
    println!("  Cooldown: {:?}", config.breaker.cooldown());

    println!("\nPoliteness:");
    println!("  Min host interval: {:?}", config.politeness.min_host_interval());
    println!("  Check robots.txt: {}", config.politeness.check_robots);

    let policy = AllowlistPolicy::from_env()?;
    let snapshot = policy.snapshot();
    println!("\nEgress Policy:");
    println!("  Mode: {}", snapshot.mode);
    println!("  Allow all: {}", snapshot.allow_all);
    println!("  Domains ({}):", snapshot.allowed_domains.len());
    for domain in &snapshot.allowed_domains {
        println!("    - {}", domain);
    }
    println!("  Digest: {}", snapshot.digest);

    if let Some(hash) = config_hash {
        println!("\nConfig hash: {}", hash);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
