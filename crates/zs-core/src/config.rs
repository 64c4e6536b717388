//! Runtime configuration
//!
//! Every field has a default matching the shipped extension, so a config
//! file only needs to name what it overrides.

use serde::{Deserialize, Serialize};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables shared by every context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Key of the settings document inside the storage area
    pub storage_key: String,
    /// Name of the synchronized storage area the document lives in
    pub storage_area: String,
    /// Native messaging host name of the desktop companion
    pub native_host: String,
    /// Prefix of injected style element ids
    pub style_prefix: String,
    /// Observe-until-found timeout; 0 waits forever
    pub watch_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_key: "zeroSixSettings".to_string(),
            storage_area: "sync".to_string(),
            native_host: "app.zerosix.host".to_string(),
            style_prefix: "zero-six-style-".to_string(),
            watch_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Parse a (possibly partial) JSON config.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
