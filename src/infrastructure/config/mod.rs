//! Configuration management infrastructure
//!
//! Hierarchical settings via figment (defaults, YAML file, environment) and
//! the YAML services file.

pub mod loader;

pub use loader::{ConfigLoader, SettingsError, DEFAULT_SERVICES_FILE, DEFAULT_SETTINGS_FILE};
