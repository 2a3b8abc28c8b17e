use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a run obtains its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Load stored snapshots only; no network traffic at all
    #[default]
    Snapshot,
    /// Fetch live; failures surface to the caller
    Live,
    /// Fetch live, falling back to snapshots on transient failures
    Auto,
}

impl ScrapeMode {
    /// Returns true if this mode may open network connections
    pub fn is_networked(&self) -> bool {
        matches!(self, Self::Live | Self::Auto)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Live => "live",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "live" => Ok(Self::Live),
            "auto" => Ok(Self::Auto),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}
