//! Status and health color mapping for CLI output.
//!
//! All coloring respects `NO_COLOR` env var automatically via the `colored` crate.

use colored::Colorize;

use crate::domain::models::{HealthState, ServiceStatus};

/// Returns a colored label for a lifecycle status.
///
/// Color scheme:
/// - Green:  running
/// - Yellow: starting, stopping
/// - Blue:   queued
/// - Red:    error
/// - Dim:    stopped
pub fn colorize_status(status: ServiceStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        ServiceStatus::Running => text.green().bold(),
        ServiceStatus::Starting => text.yellow(),
        ServiceStatus::Stopping => text.yellow().dimmed(),
        ServiceStatus::Queued => text.blue(),
        ServiceStatus::Error => text.red().bold(),
        ServiceStatus::Stopped => text.dimmed(),
    }
}

/// Returns a colored label for a health verdict.
pub fn colorize_health(health: HealthState) -> colored::ColoredString {
    let text = health.as_str();
    match health {
        HealthState::Healthy => text.green(),
        HealthState::Unhealthy => text.red(),
        HealthState::Unknown => text.dimmed(),
    }
}

/// Section header with underline.
pub fn section_header(title: &str) -> String {
    format!("\n{}", title.bold().underline())
}
