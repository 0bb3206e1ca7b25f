//! devhub - local service orchestrator
//!
//! devhub runs a stack of development services declared in a YAML file. It
//! starts them in dependency order, waits for each dependency to report
//! healthy before starting its dependents, captures their output, and keeps
//! a live table of status, health, and resource usage.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors, and the ports processes and
//!   probes are driven through
//! - **Service Layer** (`services`): dependency resolution, health monitoring,
//!   log buffering, the service manager, and the state aggregator
//! - **Infrastructure Layer** (`infrastructure`): config loading, logging,
//!   tokio process launching, and sysinfo process probing
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devhub::{ConfigLoader, ServiceManager, Settings, TokioProcessLauncher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let services = ConfigLoader::load_services("devhub.yml")?;
//!     let manager = ServiceManager::from_config(
//!         &services,
//!         Arc::new(TokioProcessLauncher::new()),
//!         &Settings::default(),
//!     )?;
//!     manager.start_all().await;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ConfigError, DependencyError, ManagerError, ServiceError};
pub use domain::models::{
    HealthProbe, HealthSpec, HealthState, HostStats, ServiceConfig, ServiceSnapshot, ServiceSpec,
    ServiceStatus, Settings,
};
pub use domain::ports::{HealthChecker, ProcessLauncher, ProcessProbe};
pub use infrastructure::config::ConfigLoader;
pub use infrastructure::process::{SysinfoProbe, TokioProcessLauncher};
pub use services::{
    CircularLogBuffer, DependencyResolver, HealthMonitor, ServiceInstance, ServiceManager,
    StateManager,
};
