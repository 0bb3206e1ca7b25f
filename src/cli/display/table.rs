//! Table builder wrapper around comfy-table for consistent list display.

use colored::Colorize;
use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

use super::colors::{colorize_health, colorize_status};
use super::format::{format_cpu, format_memory, format_uptime, truncate_ellipsis};
use crate::domain::models::{HostStats, ServiceSnapshot};

const ERROR_WIDTH: usize = 48;

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Render the table to string with a count header.
pub fn render_list(entity_name: &str, table: &Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let count_line = format!(
        "{} {}:",
        total.to_string().bold(),
        if total == 1 {
            entity_name.to_string()
        } else {
            format!("{entity_name}s")
        }
    );
    format!("{count_line}\n{table}")
}

/// Live status table of every service.
pub fn services_table(services: &[ServiceSnapshot]) -> Table {
    let mut table = list_table(&[
        "name", "status", "health", "pid", "port", "cpu", "mem", "uptime", "error",
    ]);

    for service in services {
        table.add_row(vec![
            Cell::new(service.name.bold()),
            Cell::new(colorize_status(service.status)),
            Cell::new(colorize_health(service.health)),
            Cell::new(service.pid.map_or_else(|| "-".to_string(), |p| p.to_string())),
            Cell::new(service.port.map_or_else(|| "-".to_string(), |p| p.to_string())),
            Cell::new(format_cpu(service.cpu_percent)).set_alignment(CellAlignment::Right),
            Cell::new(format_memory(service.memory_mb)).set_alignment(CellAlignment::Right),
            Cell::new(format_uptime(service.uptime())),
            Cell::new(
                service
                    .error
                    .as_deref()
                    .map_or_else(String::new, |e| truncate_ellipsis(e, ERROR_WIDTH))
                    .red(),
            ),
        ]);
    }

    table
}

/// One-line host summary.
pub fn host_line(host: &HostStats) -> String {
    format!(
        "{} cpu {:.1}%  mem {} ({:.0}%)",
        "host".dimmed(),
        host.cpu_percent,
        format_memory(host.memory_mb),
        host.memory_percent
    )
}
