//! Configuration loading and setting resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file never aborts startup; it is logged and
//! the remaining tiers are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MOODLENS_CONFIG";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info", "moodlens_analyzer=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// On-disk configuration (`analyzer.toml`)
///
/// Every field is optional so partial files are valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Analysis endpoint accepting job submissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// Provider mode used when the caller does not pick one ("cloud" or "local")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,

    /// Delay before the automatic retry of a busy job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_retry_delay_ms: Option<u64>,

    /// TCP connect timeout for the analysis service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Event bus channel capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_capacity: Option<usize>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default config file location for the platform
///
/// `MOODLENS_CONFIG` wins; otherwise `<config dir>/moodlens/analyzer.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join("moodlens").join("analyzer.toml"))
}

/// Load a TOML config file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(Some(config))
}

/// Load a TOML config file, degrading to defaults on any error
pub fn load_toml_config_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        return TomlConfig::default();
    };

    match load_toml_config(path) {
        Ok(Some(config)) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Ok(None) => {
            info!("No config file at {}, using defaults", path.display());
            TomlConfig::default()
        }
        Err(e) => {
            warn!("Ignoring unreadable config file {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Where a resolved setting came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    CommandLine,
    Environment,
    Toml,
    Default,
}

impl SettingSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommandLine => "command line",
            Self::Environment => "environment",
            Self::Toml => "TOML",
            Self::Default => "default",
        }
    }
}

impl Display for SettingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setting value together with its source
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: SettingSource,
}

/// Resolve one setting from the four tiers
///
/// The environment value is parsed with `FromStr`; an unparsable value is
/// reported as a configuration error rather than silently skipped.
pub fn resolve_setting<T>(
    name: &str,
    cli: Option<T>,
    env_var: &str,
    toml: Option<T>,
    default: T,
) -> Result<Resolved<T>>
where
    T: FromStr + Clone,
    T::Err: Display,
{
    let env_value = match std::env::var(env_var) {
        Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<T>().map_err(|e| {
            Error::Config(format!("{} has invalid value '{}': {}", env_var, raw, e))
        })?),
        _ => None,
    };

    let mut sources = Vec::new();
    if cli.is_some() {
        sources.push(SettingSource::CommandLine.as_str());
    }
    if env_value.is_some() {
        sources.push(SettingSource::Environment.as_str());
    }
    if toml.is_some() {
        sources.push(SettingSource::Toml.as_str());
    }
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    let resolved = if let Some(value) = cli {
        Resolved { value, source: SettingSource::CommandLine }
    } else if let Some(value) = env_value {
        Resolved { value, source: SettingSource::Environment }
    } else if let Some(value) = toml {
        Resolved { value, source: SettingSource::Toml }
    } else {
        Resolved { value: default, source: SettingSource::Default }
    };

    info!("{} loaded from {}", name, resolved.source);
    Ok(resolved)
}
