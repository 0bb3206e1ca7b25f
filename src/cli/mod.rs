//! Command-line interface for devhub.

pub mod commands;
pub mod display;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::infrastructure::config::DEFAULT_SERVICES_FILE;

#[derive(Parser, Debug)]
#[command(name = "devhub")]
#[command(about = "devhub - run a local stack of development services", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Services file to load
    #[arg(short, long, global = true, env = "DEVHUB_CONFIG", default_value = DEFAULT_SERVICES_FILE)]
    pub config: PathBuf,

    /// Settings file (defaults to .devhub/settings.yaml when present)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services in dependency order and show live status until Ctrl-C
    Up(commands::up::UpArgs),

    /// Print the resolved start order
    Order,

    /// Validate the services file and show what each service runs
    Check,
}

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {}", "error:".red().bold(), err);
        for cause in err.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
    }
    std::process::exit(1);
}
