use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{ServiceConfig, Settings};

/// Services file read when no path is given
pub const DEFAULT_SERVICES_FILE: &str = "devhub.yml";

/// Project-local settings file
pub const DEFAULT_SETTINGS_FILE: &str = ".devhub/settings.yaml";

/// Settings validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid {0}: must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Invalid log buffer: trim_bytes ({trim}) must be between 1 and max_bytes ({max})")]
    InvalidLogBuffer { max: usize, trim: usize },

    #[error("Invalid queue_capacity: must be at least 1")]
    ZeroQueueCapacity,
}

/// Loads orchestrator settings and service declarations
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .devhub/settings.yaml (optional)
    /// 3. Environment variables (DEVHUB_* prefix, `__` between sections)
    pub fn load_settings() -> Result<Settings> {
        Self::load_settings_from(DEFAULT_SETTINGS_FILE)
    }

    /// Load settings using a specific YAML file in place of the default one
    pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("DEVHUB_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load settings from {}", path.as_ref().display()))?;

        Self::validate(&settings)?;
        Ok(settings)
    }

    /// Read the services file: a map of service name to declaration
    pub fn load_services(path: impl AsRef<Path>) -> Result<BTreeMap<String, ServiceConfig>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read services file {}", path.display()))?;
        Self::parse_services(&raw)
            .with_context(|| format!("Failed to parse services file {}", path.display()))
    }

    /// Parse services YAML. An empty document declares no services.
    pub fn parse_services(raw: &str) -> Result<BTreeMap<String, ServiceConfig>> {
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let services: Option<BTreeMap<String, ServiceConfig>> = serde_yaml::from_str(raw)?;
        Ok(services.unwrap_or_default())
    }

    /// Validate settings after loading
    pub fn validate(settings: &Settings) -> Result<(), SettingsError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&settings.logging.level.to_lowercase().as_str()) {
            return Err(SettingsError::InvalidLogLevel(settings.logging.level.clone()));
        }

        let manager = &settings.manager;
        let state = &settings.state;
        let durations = [
            ("manager.dependency_timeout_ms", manager.dependency_timeout_ms),
            ("manager.health_poll_ms", manager.health_poll_ms),
            ("manager.stop_timeout_ms", manager.stop_timeout_ms),
            ("manager.shutdown_timeout_ms", manager.shutdown_timeout_ms),
            ("state.status_interval_ms", state.status_interval_ms),
            ("state.resource_interval_ms", state.resource_interval_ms),
            ("state.host_interval_ms", state.host_interval_ms),
            ("state.probe_timeout_ms", state.probe_timeout_ms),
        ];
        if let Some((field, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::ZeroDuration(field));
        }

        if state.queue_capacity == 0 {
            return Err(SettingsError::ZeroQueueCapacity);
        }

        let buffer = &settings.log_buffer;
        if buffer.trim_bytes == 0 || buffer.trim_bytes > buffer.max_bytes {
            return Err(SettingsError::InvalidLogBuffer {
                max: buffer.max_bytes,
                trim: buffer.trim_bytes,
            });
        }

        Ok(())
    }
}
