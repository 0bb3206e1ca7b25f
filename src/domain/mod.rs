//! Domain layer for the devhub orchestrator
//!
//! Service declarations, lifecycle states, snapshots, errors, and the ports
//! the orchestrator consumes.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    ConfigError, DependencyError, HealthCheckError, ManagerError, ProbeError, ProcessError,
    ServiceError, ServiceResult,
};
