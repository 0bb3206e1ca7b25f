//! Infrastructure layer module
//!
//! Adapters for the domain ports and the process environment:
//! - Configuration management (figment + YAML)
//! - Logging infrastructure (tracing)
//! - Process spawning and introspection (tokio, nix, sysinfo)

pub mod config;
pub mod logging;
pub mod process;
