//! Service declarations.
//!
//! [`ServiceConfig`] is the raw shape read from the services file;
//! [`ServiceSpec`] is the validated, immutable form the orchestrator runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::errors::ConfigError;

pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_HEALTH_START_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_HEALTH_RETRIES: u32 = 3;

/// A service entry as written in the services file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Human-readable description
    #[serde(default)]
    pub desc: String,

    /// Command line to run
    #[serde(default)]
    pub run: String,

    /// Per-OS command overrides keyed by OS identifier (`linux`, `macos`/`darwin`, `windows`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub os: BTreeMap<String, String>,

    /// Port the service listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Services that must be healthy before this one starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Optional readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthConfig>,
}

/// Raw health block. Exactly one of `tcp`, `http`, `cmd` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Start period before failures count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// The single probe a health check runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProbe {
    Tcp { host: String, port: u16 },
    Http { url: String },
    Command { argv: Vec<String> },
}

/// Validated health check settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSpec {
    pub probe: HealthProbe,
    pub interval: Duration,
    pub timeout: Duration,
    pub start_period: Duration,
    /// Consecutive identical outcomes required to flip state
    pub retries: u32,
}

impl HealthSpec {
    pub fn new(probe: HealthProbe) -> Self {
        Self {
            probe,
            interval: DEFAULT_HEALTH_INTERVAL,
            timeout: DEFAULT_HEALTH_TIMEOUT,
            start_period: DEFAULT_HEALTH_START_PERIOD,
            retries: DEFAULT_HEALTH_RETRIES,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_start_period(mut self, start_period: Duration) -> Self {
        self.start_period = start_period;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }
}

/// Immutable, validated service declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub run: String,
    pub os_overrides: BTreeMap<String, String>,
    pub port: Option<u16>,
    pub needs: Vec<String>,
    pub health: Option<HealthSpec>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            run: run.into(),
            os_overrides: BTreeMap::new(),
            port: None,
            needs: Vec::new(),
            health: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_health(mut self, health: HealthSpec) -> Self {
        self.health = Some(health);
        self
    }

    #[must_use]
    pub fn with_os_override(mut self, os: impl Into<String>, run: impl Into<String>) -> Self {
        self.os_overrides.insert(os.into(), run.into());
        self
    }

    /// Build a validated spec from a services-file entry.
    pub fn from_config(name: &str, config: &ServiceConfig) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }

        let health = config
            .health
            .as_ref()
            .map(|hc| build_health_spec(name, config.port, hc))
            .transpose()?;

        let spec = Self {
            name: name.to_string(),
            description: config.desc.clone(),
            run: config.run.clone(),
            os_overrides: config.os.clone(),
            port: config.port.filter(|p| *p > 0),
            needs: config.needs.clone(),
            health,
        };

        spec.validate()?;
        Ok(spec)
    }

    /// Check that the effective command is runnable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.command_line().is_empty() {
            return Err(ConfigError::EmptyCommand {
                service: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Run command for the host OS, honoring per-OS overrides.
    pub fn effective_command(&self) -> &str {
        self.effective_command_for(std::env::consts::OS)
    }

    /// Run command for the given OS identifier.
    pub fn effective_command_for(&self, os: &str) -> &str {
        os_aliases(os)
            .iter()
            .filter_map(|key| self.os_overrides.get(*key))
            .find(|cmd| !cmd.trim().is_empty())
            .map_or(self.run.as_str(), String::as_str)
    }

    /// Effective command split into program and arguments.
    pub fn command_line(&self) -> Vec<String> {
        split_command(self.effective_command())
    }
}

fn os_aliases(os: &str) -> &[&str] {
    match os {
        "macos" | "darwin" => &["macos", "darwin"],
        "linux" => &["linux"],
        "windows" => &["windows"],
        "freebsd" => &["freebsd"],
        _ => &[],
    }
}

fn build_health_spec(
    service: &str,
    port: Option<u16>,
    hc: &HealthConfig,
) -> Result<HealthSpec, ConfigError> {
    let mut kinds = Vec::new();
    if hc.tcp.is_some() {
        kinds.push("tcp");
    }
    if hc.http.as_deref().is_some_and(|s| !s.is_empty()) {
        kinds.push("http");
    }
    if hc.cmd.is_some() {
        kinds.push("cmd");
    }
    if kinds.len() > 1 {
        return Err(ConfigError::MultipleHealthProbes {
            service: service.to_string(),
            kinds: kinds.join(", "),
        });
    }

    let probe = if let Some(tcp) = hc.tcp {
        HealthProbe::Tcp {
            host: "localhost".to_string(),
            port: tcp,
        }
    } else if let Some(http) = hc.http.as_deref().filter(|s| !s.is_empty()) {
        HealthProbe::Http {
            url: resolve_health_url(service, port, http)?,
        }
    } else if let Some(cmd) = hc.cmd.as_deref() {
        let argv = split_command(cmd);
        if argv.is_empty() {
            return Err(ConfigError::EmptyHealthCommand {
                service: service.to_string(),
            });
        }
        HealthProbe::Command { argv }
    } else {
        return Err(ConfigError::MissingHealthProbe {
            service: service.to_string(),
        });
    };

    let duration = |field: &'static str, value: Option<&String>, default: Duration| {
        value.map_or(Ok(default), |raw| {
            parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
                service: service.to_string(),
                field,
                value: raw.clone(),
            })
        })
    };

    let retries = hc.retries.unwrap_or(DEFAULT_HEALTH_RETRIES);
    if retries == 0 {
        return Err(ConfigError::InvalidRetries {
            service: service.to_string(),
        });
    }

    Ok(HealthSpec {
        probe,
        interval: duration("interval", hc.interval.as_ref(), DEFAULT_HEALTH_INTERVAL)?,
        timeout: duration("timeout", hc.timeout.as_ref(), DEFAULT_HEALTH_TIMEOUT)?,
        start_period: duration("wait", hc.wait.as_ref(), DEFAULT_HEALTH_START_PERIOD)?,
        retries,
    })
}

/// A bare path (`/health`) is resolved against the service's own port.
fn resolve_health_url(service: &str, port: Option<u16>, raw: &str) -> Result<String, ConfigError> {
    if raw.starts_with('/') {
        return match port.filter(|p| *p > 0) {
            Some(port) => Ok(format!("http://localhost:{port}{raw}")),
            None => Err(ConfigError::HealthPathWithoutPort {
                service: service.to_string(),
                path: raw.to_string(),
            }),
        };
    }
    Ok(raw.to_string())
}

/// Split a command string into program and arguments.
///
/// Single and double quotes group words; quote characters are dropped. No
/// shell expansion takes place.
pub fn split_command(cmd: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in cmd.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    parts.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        parts.push(current);
    }

    parts
}

/// Parse durations like `500ms`, `5s`, `1m30s`, `2h`. A bare `0` is accepted.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total += Duration::try_from_secs_f64(value * unit_secs).ok()?;
    }

    Some(total)
}
