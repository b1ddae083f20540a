//! Configuration loading for the `mba-check` command line.
//!
//! Read from `~/.mba-check/config.toml` unless a path is given. A missing
//! file yields defaults; a present but malformed file is an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy selection.
    pub policy: PolicyConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Which policy to verify with and how.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Registered policy name.
    pub name: String,

    /// Drop events at PCRs the policy does not declare relevant before
    /// validating.
    pub only_relevant_pcrs: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            only_relevant_pcrs: false,
        }
    }
}

/// Log output settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSON log files; console only when unset.
    pub dir: Option<PathBuf>,

    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_level(),
        }
    }
}

fn default_policy_name() -> String {
    crate::policy::example::NAME.to_owned()
}
fn default_level() -> String {
    "info".to_owned()
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

/// Resolve the default config directory (`~/.mba-check/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".mba-check"))
}

/// Default config file path.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
