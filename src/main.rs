//! devhub CLI entry point.

use anyhow::Result;
use clap::Parser;

use devhub::cli::{commands, handle_error, Cli, Commands};
use devhub::domain::models::Settings;
use devhub::infrastructure::config::ConfigLoader;
use devhub::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&settings.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Up(args) => commands::up::execute(args, &cli.config, &settings, cli.json).await,
        Commands::Order => commands::order::execute(&cli.config, &settings, cli.json),
        Commands::Check => commands::check::execute(&cli.config, &settings, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.settings {
        Some(path) => ConfigLoader::load_settings_from(path),
        None => ConfigLoader::load_settings(),
    }
}
