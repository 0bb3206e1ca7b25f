//! Implementation of the `devhub order` command.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::cli::commands::load_manager;
use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Settings;

#[derive(Debug, Serialize)]
pub struct OrderOutput {
    pub order: Vec<String>,
}

impl CommandOutput for OrderOutput {
    fn to_human(&self) -> String {
        if self.order.is_empty() {
            return "No services declared.".to_string();
        }
        self.order
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{:>3}. {}", (i + 1).to_string().dimmed(), name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.order).unwrap_or_default()
    }
}

pub fn execute(config_path: &Path, settings: &Settings, json_mode: bool) -> Result<()> {
    let manager = load_manager(config_path, settings)?;
    let out = OrderOutput {
        order: manager.start_order().to_vec(),
    };
    output(&out, json_mode);
    Ok(())
}
