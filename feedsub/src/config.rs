//! feedsub configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fetch::SimulatedFetcherConfig;
use crate::subscription::SubscriptionConfig;

/// Main feedsub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Subscription loop tuning
    pub subscription: SubscriptionConfig,

    /// Simulated source used by `feedsub run`
    pub fetcher: SimulatedFetcherConfig,
}

impl Config {
    /// Config files tried in order when no path is given
    ///
    /// `./.feedsub.yml`, then `~/.config/feedsub/feedsub.yml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".feedsub.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("feedsub").join("feedsub.yml"));
        }
        paths
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first search path that exists
    /// and parses wins, and defaults apply when none does.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }
        Self::load_first(&Self::search_paths())
    }

    fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {}", path.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::search_paths(),
        };

        candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| Self::load_from_file(path).ok())
            .and_then(|config| config.log_level)
    }

    /// Check the loaded values before use
    pub fn validate(&self) -> Result<()> {
        self.subscription.validate()?;
        if !(0.0..=1.0).contains(&self.fetcher.failure_rate) {
            return Err(eyre::eyre!(
                "fetcher.failure-rate must be between 0 and 1, got {}",
                self.fetcher.failure_rate
            ));
        }
        Ok(())
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
