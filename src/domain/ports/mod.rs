//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the orchestrator consumes but does not implement itself:
//! - ProcessLauncher / ProcessControl: spawning and signalling child processes
//! - ProcessProbe: process-table and host resource readings
//! - HealthChecker: a single readiness probe
//!
//! Infrastructure adapters implement these; tests substitute fakes.

pub mod health;
pub mod introspection;
pub mod process;

pub use health::HealthChecker;
pub use introspection::ProcessProbe;
pub use process::{ProcessControl, ProcessExit, ProcessLauncher, SpawnedProcess};
