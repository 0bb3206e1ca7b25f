//! Domain errors for the devhub orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Invalid service declarations. Fatal at manager construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("empty command for service {service}")]
    EmptyCommand { service: String },

    #[error("service name cannot be empty")]
    EmptyServiceName,

    #[error("no valid health check configuration found for service {service}")]
    MissingHealthProbe { service: String },

    #[error("service {service} declares more than one health probe ({kinds}); exactly one is allowed")]
    MultipleHealthProbes { service: String, kinds: String },

    #[error("empty health check command for service {service}")]
    EmptyHealthCommand { service: String },

    #[error("service {service} has an HTTP health path {path} but no port to resolve it against")]
    HealthPathWithoutPort { service: String, path: String },

    #[error("invalid {field} duration {value:?} for service {service}")]
    InvalidDuration {
        service: String,
        field: &'static str,
        value: String,
    },

    #[error("invalid retries for service {service}: must be at least 1")]
    InvalidRetries { service: String },
}

/// Broken dependency graph. Fatal at manager construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("service {service} depends on {dependency}, which is not declared")]
    MissingDependency { service: String, dependency: String },

    #[error("circular dependency detected at service {service}")]
    Cycle { service: String },
}

impl DependencyError {
    /// The service named by this error.
    pub fn service(&self) -> &str {
        match self {
            Self::MissingDependency { service, .. } | Self::Cycle { service } => service,
        }
    }
}

/// Construction failure of a [`crate::services::ServiceManager`].
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid service configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("dependency resolution failed: {0}")]
    Dependency(#[from] DependencyError),

    #[error("duplicate service name: {0}")]
    DuplicateService(String),
}

/// Errors from the process-control port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("process {pid} is no longer running")]
    Gone { pid: u32 },
}

/// A failed process-table lookup. Never surfaced to callers; degrades to a
/// zero or partial reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("process table unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed single health probe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthCheckError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("command exited with {0}")]
    CommandFailed(String),
}

/// Errors scoped to a single start/stop operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("failed to start {service}: {source}")]
    Start {
        service: String,
        #[source]
        source: ProcessError,
    },

    #[error("dependency {dependency} of {service} did not become healthy within {timeout:?}")]
    HealthTimeout {
        service: String,
        dependency: String,
        timeout: Duration,
    },

    #[error("{service} did not exit after being killed")]
    StopTimeout { service: String },

    #[error("orchestrator is shutting down")]
    Cancelled,
}

pub type ServiceResult<T> = Result<T, ServiceError>;
