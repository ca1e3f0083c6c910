//! Analyzer settings
//!
//! Each setting resolves from command line, then environment, then the TOML
//! file, then the compiled default.

use crate::models::AnalysisMode;
use crate::recovery::BusyRetryPolicy;
use moodlens_common::config::{resolve_setting, LoggingConfig, TomlConfig};
use moodlens_common::{Error, Result};
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000/api/analyze";
pub const DEFAULT_BUSY_RETRY_MS: u64 = 3500;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

pub const SERVICE_URL_ENV: &str = "MOODLENS_SERVICE_URL";
pub const MODE_ENV: &str = "MOODLENS_MODE";
pub const BUSY_RETRY_ENV: &str = "MOODLENS_BUSY_RETRY_MS";
pub const CONNECT_TIMEOUT_ENV: &str = "MOODLENS_CONNECT_TIMEOUT_SECS";
pub const EVENT_CAPACITY_ENV: &str = "MOODLENS_EVENT_CAPACITY";

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub service_url: Option<String>,
    pub mode: Option<AnalysisMode>,
    pub busy_retry_delay_ms: Option<u64>,
}

/// Fully resolved analyzer settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub service_url: String,
    pub default_mode: AnalysisMode,
    pub busy_retry: BusyRetryPolicy,
    pub connect_timeout: Duration,
    pub event_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            default_mode: AnalysisMode::default(),
            busy_retry: BusyRetryPolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let service_url = resolve_setting(
            "service_url",
            overrides.service_url.clone(),
            SERVICE_URL_ENV,
            toml.service_url.clone(),
            DEFAULT_SERVICE_URL.to_string(),
        )?;
        if service_url.value.trim().is_empty() {
            return Err(Error::Config("service_url must not be empty".to_string()));
        }

        let toml_mode = toml
            .default_mode
            .as_deref()
            .map(str::parse::<AnalysisMode>)
            .transpose()
            .map_err(|e| Error::Config(format!("default_mode: {}", e)))?;
        let mode = resolve_setting(
            "default_mode",
            overrides.mode,
            MODE_ENV,
            toml_mode,
            AnalysisMode::default(),
        )?;

        let retry_ms = resolve_setting(
            "busy_retry_delay_ms",
            overrides.busy_retry_delay_ms,
            BUSY_RETRY_ENV,
            toml.busy_retry_delay_ms,
            DEFAULT_BUSY_RETRY_MS,
        )?;

        let connect_timeout = resolve_setting(
            "connect_timeout_secs",
            None,
            CONNECT_TIMEOUT_ENV,
            toml.connect_timeout_secs,
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;

        let event_capacity = resolve_setting(
            "event_capacity",
            None,
            EVENT_CAPACITY_ENV,
            toml.event_capacity,
            DEFAULT_EVENT_CAPACITY,
        )?;
        if event_capacity.value == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }

        Ok(Self {
            service_url: service_url.value,
            default_mode: mode.value,
            busy_retry: BusyRetryPolicy {
                delay: Duration::from_millis(retry_ms.value),
                ..BusyRetryPolicy::default()
            },
            connect_timeout: Duration::from_secs(connect_timeout.value),
            event_capacity: event_capacity.value,
            logging: toml.logging.clone(),
        })
    }
}
