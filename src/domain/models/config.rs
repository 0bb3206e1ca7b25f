use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator settings (not the service declarations themselves)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Start/stop cascade timings
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Background polling cadences
    #[serde(default)]
    pub state: StateSettings,

    /// Per-service output buffer sizing
    #[serde(default)]
    pub log_buffer: LogBufferSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Timings used by the service manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ManagerSettings {
    /// Overall deadline for a dependency to report healthy
    #[serde(default = "default_dependency_timeout_ms")]
    pub dependency_timeout_ms: u64,

    /// Poll tick while waiting for dependency health
    #[serde(default = "default_health_poll_ms")]
    pub health_poll_ms: u64,

    /// Grace period between terminate and kill when stopping a service
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Per-instance bound during shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Pause between stop and start on restart
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

const fn default_dependency_timeout_ms() -> u64 {
    30_000
}

const fn default_health_poll_ms() -> u64 {
    500
}

const fn default_stop_timeout_ms() -> u64 {
    10_000
}

const fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

const fn default_restart_delay_ms() -> u64 {
    1_000
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            dependency_timeout_ms: default_dependency_timeout_ms(),
            health_poll_ms: default_health_poll_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl ManagerSettings {
    pub const fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    pub const fn health_poll(&self) -> Duration {
        Duration::from_millis(self.health_poll_ms)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Cadences of the state manager's polling tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StateSettings {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_resource_interval_ms")]
    pub resource_interval_ms: u64,

    #[serde(default = "default_host_interval_ms")]
    pub host_interval_ms: u64,

    /// Bound on one resource fan-out cycle
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Capacity of each update queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

const fn default_status_interval_ms() -> u64 {
    2_000
}

const fn default_resource_interval_ms() -> u64 {
    3_000
}

const fn default_host_interval_ms() -> u64 {
    3_000
}

const fn default_probe_timeout_ms() -> u64 {
    2_000
}

const fn default_queue_capacity() -> usize {
    100
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            resource_interval_ms: default_resource_interval_ms(),
            host_interval_ms: default_host_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl StateSettings {
    pub const fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub const fn resource_interval(&self) -> Duration {
        Duration::from_millis(self.resource_interval_ms)
    }

    pub const fn host_interval(&self) -> Duration {
        Duration::from_millis(self.host_interval_ms)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Sizing of each service's output buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogBufferSettings {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Bytes evicted when the buffer overflows
    #[serde(default = "default_trim_bytes")]
    pub trim_bytes: usize,

    /// How far past the trim point to look for a line break
    #[serde(default = "default_lookahead_bytes")]
    pub lookahead_bytes: usize,
}

const fn default_max_bytes() -> usize {
    1024 * 1024
}

const fn default_trim_bytes() -> usize {
    256 * 1024
}

const fn default_lookahead_bytes() -> usize {
    1024
}

impl Default for LogBufferSettings {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            trim_bytes: default_trim_bytes(),
            lookahead_bytes: default_lookahead_bytes(),
        }
    }
}
