//! Client configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. `--base-url` on the command line
//! 2. Environment variables (`GROUP_OPTIONS_*`)
//! 3. TOML file passed with `--config`
//! 4. Built-in defaults
//!
//! | Key                  | Env var                            | Default                 |
//! |----------------------|------------------------------------|-------------------------|
//! | `base_url`           | `GROUP_OPTIONS_BASE_URL`           | `http://localhost:5000` |
//! | `timeout_secs`       | `GROUP_OPTIONS_TIMEOUT_SECS`       | `30`                    |
//! | `default_group_size` | `GROUP_OPTIONS_DEFAULT_GROUP_SIZE` | `5`                     |

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use selection::request::{parse_group_size, DEFAULT_GROUP_SIZE};

const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_BASE_URL: &str = "GROUP_OPTIONS_BASE_URL";
const ENV_TIMEOUT_SECS: &str = "GROUP_OPTIONS_TIMEOUT_SECS";
const ENV_DEFAULT_GROUP_SIZE: &str = "GROUP_OPTIONS_DEFAULT_GROUP_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin serving `/api/cims/*` and `/api/personalityData`.
    pub base_url: String,
    /// Per-request timeout for every remote call.
    pub timeout_secs: u64,
    /// Initial value of the group-size input.
    pub default_group_size: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_group_size: DEFAULT_GROUP_SIZE,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `GROUP_OPTIONS_*` overrides. Unparsable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => warn!(var = ENV_TIMEOUT_SECS, value = %raw, "Ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_DEFAULT_GROUP_SIZE) {
            match raw.parse() {
                Ok(size) => self.default_group_size = size,
                Err(_) => {
                    warn!(var = ENV_DEFAULT_GROUP_SIZE, value = %raw, "Ignoring invalid override")
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must be an http(s) URL, got {:?}", self.base_url);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        parse_group_size(&self.default_group_size.to_string())
            .context("default_group_size is out of range")?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
