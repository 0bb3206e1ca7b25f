//! CLI command implementations.

pub mod check;
pub mod order;
pub mod up;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::domain::models::Settings;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::process::TokioProcessLauncher;
use crate::services::ServiceManager;

/// Load the services file and build a manager that launches real processes.
///
/// Services run from the directory containing the services file.
pub fn load_manager(config_path: &Path, settings: &Settings) -> Result<ServiceManager> {
    let services = ConfigLoader::load_services(config_path)?;

    let mut launcher = TokioProcessLauncher::new();
    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        launcher = launcher.with_working_dir(dir);
    }

    ServiceManager::from_config(&services, Arc::new(launcher), settings)
        .with_context(|| format!("Invalid services file {}", config_path.display()))
}
