//! Implementation of the `devhub check` command.

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;
use std::path::Path;

use crate::cli::commands::load_manager;
use crate::cli::display::{action_success, list_table, output, truncate_ellipsis, CommandOutput};
use crate::domain::models::Settings;
use crate::services::{checker_for, ServiceManager};

const COMMAND_WIDTH: usize = 40;

#[derive(Debug, Serialize)]
pub struct ServiceCheck {
    pub name: String,
    pub command: String,
    pub port: Option<u16>,
    pub needs: Vec<String>,
    pub health: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub config: String,
    pub services: Vec<ServiceCheck>,
    pub start_order: Vec<String>,
}

impl CheckOutput {
    fn from_manager(config: &Path, manager: &ServiceManager) -> Self {
        let services = manager
            .instances()
            .iter()
            .map(|instance| {
                let spec = instance.spec();
                ServiceCheck {
                    name: spec.name.clone(),
                    command: spec.effective_command().to_string(),
                    port: spec.port,
                    needs: spec.needs.clone(),
                    health: spec
                        .health
                        .as_ref()
                        .map(|h| checker_for(&h.probe, h.timeout).describe()),
                }
            })
            .collect();

        Self {
            config: config.display().to_string(),
            services,
            start_order: manager.start_order().to_vec(),
        }
    }
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["name", "command", "port", "needs", "health"]);
        for service in &self.services {
            table.add_row(vec![
                Cell::new(&service.name),
                Cell::new(truncate_ellipsis(&service.command, COMMAND_WIDTH)),
                Cell::new(service.port.map_or_else(|| "-".to_string(), |p| p.to_string())),
                Cell::new(if service.needs.is_empty() {
                    "-".to_string()
                } else {
                    service.needs.join(", ")
                }),
                Cell::new(service.health.as_deref().unwrap_or("-")),
            ]);
        }

        format!(
            "{}\n\n{}\nstart order: {}",
            action_success(&format!("{} is valid ({} services)", self.config, self.services.len())),
            table,
            self.start_order.join(" -> ")
        )
    }
}

pub fn execute(config_path: &Path, settings: &Settings, json_mode: bool) -> Result<()> {
    let manager = load_manager(config_path, settings)?;
    output(&CheckOutput::from_manager(config_path, &manager), json_mode);
    Ok(())
}
