//! Bridge configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_MINT_URL: &str = "https://mint.minibits.cash/Bitcoin";

/// Bridge configuration.
///
/// Only the raw connection string is persisted; the descriptor's derived
/// fields are recomputed on load so the stored form never drifts from the
/// parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Active mint endpoint
    pub mint_url: String,
    /// Last-used wallet-connect pairing string
    pub connection_string: Option<String>,
    /// Funding confirmation poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Funding confirmation deadline in seconds
    pub confirm_timeout_secs: u64,
    /// Budget per relay attempt in seconds
    pub relay_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mint_url: DEFAULT_MINT_URL.to_string(),
            connection_string: None,
            poll_interval_ms: 2_000,
            confirm_timeout_secs: 120,
            relay_timeout_secs: 10,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the default path, creating it if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, creating it with defaults if absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(Error::NoHomeDir)?;
        Ok(home.join(".satchel").join("bridge.json"))
    }
}
