pub mod config;
pub mod service;
pub mod snapshot;
pub mod status;

pub use config::{
    LogBufferSettings, LogFormat, LoggingConfig, ManagerSettings, RotationPolicy, Settings,
    StateSettings,
};
pub use service::{
    parse_duration, split_command, HealthConfig, HealthProbe, HealthSpec, ServiceConfig,
    ServiceSpec,
};
pub use snapshot::{HostStats, ResourceSample, ServiceSnapshot};
pub use status::{HealthCheckResult, HealthState, ServiceStatus};
