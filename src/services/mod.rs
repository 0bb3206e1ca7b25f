pub mod dependency_resolver;
pub mod health_checker;
pub mod health_monitor;
pub mod log_buffer;
pub mod resources;
pub mod service_instance;
pub mod service_manager;
pub mod state_manager;

pub use dependency_resolver::DependencyResolver;
pub use health_checker::{checker_for, CommandHealthCheck, HttpHealthCheck, TcpHealthCheck};
pub use health_monitor::{HealthMonitor, HealthTracker};
pub use log_buffer::{CircularLogBuffer, LogLines};
pub use resources::sample_process_tree;
pub use service_instance::{InstanceOptions, ServiceInstance};
pub use service_manager::ServiceManager;
pub use state_manager::{ResourceUpdate, StateManager, StateTable};
