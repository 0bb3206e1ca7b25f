//! Implementation of the `devhub up` command.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::cli::commands::load_manager;
use crate::cli::display::{
    action_failure, host_line, output, render_list, section_header, services_table, CommandOutput,
};
use crate::domain::errors::ServiceError;
use crate::domain::models::{HostStats, ServiceSnapshot, ServiceStatus, Settings};
use crate::domain::ports::ProcessProbe;
use crate::infrastructure::process::SysinfoProbe;
use crate::services::{ServiceManager, StateManager};

#[derive(Args, Debug)]
pub struct UpArgs {
    /// Services to start (all when omitted); their dependencies start first
    pub services: Vec<String>,

    /// Status refresh interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub refresh_ms: u64,

    /// Print one status frame once startup settles, then stop everything
    #[arg(long)]
    pub once: bool,

    /// Log lines shown for each failed service on exit
    #[arg(long, default_value = "20")]
    pub tail: usize,
}

/// One rendering of the live status view.
#[derive(Debug, Serialize)]
pub struct StatusFrame {
    pub services: Vec<ServiceSnapshot>,
    pub host: HostStats,
}

impl CommandOutput for StatusFrame {
    fn to_human(&self) -> String {
        let table = services_table(&self.services);
        format!(
            "{}\n\n{}",
            render_list("service", &table, self.services.len()),
            host_line(&self.host)
        )
    }
}

type StartFailures = Vec<(String, ServiceError)>;

pub async fn execute(args: UpArgs, config_path: &Path, settings: &Settings, json_mode: bool) -> Result<()> {
    let manager = Arc::new(load_manager(config_path, settings)?);
    for name in &args.services {
        if manager.instance(name).is_none() {
            bail!(ServiceError::NotFound(name.clone()));
        }
    }

    let probe: Arc<dyn ProcessProbe> = Arc::new(SysinfoProbe::new());
    let state = StateManager::new(Arc::clone(&manager), probe, settings.state.clone());
    state.start();

    let mut starter = spawn_starter(Arc::clone(&manager), args.services.clone());
    let mut starter_done = false;
    let mut failures = StartFailures::new();
    let mut ticker = interval(Duration::from_millis(args.refresh_ms.max(50)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let interactive = !json_mode && std::io::stdout().is_terminal();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("interrupt received, stopping services");
                break;
            }
            joined = &mut starter, if !starter_done => {
                starter_done = true;
                failures = joined.unwrap_or_default();
                report_failures(&failures);
                if args.once {
                    settle(&manager, &state, settings).await;
                    render(&state, json_mode, false);
                    break;
                }
            }
            _ = ticker.tick(), if !args.once => render(&state, json_mode, interactive),
        }
    }

    starter.abort();
    state.stop().await;
    manager.shutdown().await;

    if !json_mode {
        print_failed_logs(&manager, args.tail);
    }

    if args.once && !failures.is_empty() {
        bail!("{} service(s) failed to start", failures.len());
    }
    Ok(())
}

fn spawn_starter(manager: Arc<ServiceManager>, targets: Vec<String>) -> JoinHandle<StartFailures> {
    tokio::spawn(async move {
        if targets.is_empty() {
            return manager.start_all().await;
        }

        let mut failures = StartFailures::new();
        for target in targets {
            if let Err(e) = manager.start_service(&target).await {
                failures.push((target, e));
            }
        }
        failures
    })
}

/// Push every service's current status through the state pipeline and give
/// the consumer one status interval to apply it.
async fn settle(manager: &ServiceManager, state: &StateManager, settings: &Settings) {
    for instance in manager.instances() {
        state.refresh_service(instance.name());
    }
    tokio::time::sleep(settings.state.status_interval()).await;
}

fn report_failures(failures: &StartFailures) {
    for (name, err) in failures {
        warn!(service = %name, error = %err, "service failed to start");
    }
}

fn render(state: &StateManager, json_mode: bool, clear: bool) {
    let frame = StatusFrame {
        services: state.services(),
        host: state.host_stats(),
    };
    if clear {
        // clear screen, cursor home
        print!("\x1b[2J\x1b[H");
    }
    if json_mode {
        println!("{}", serde_json::to_string(&frame.to_json()).unwrap_or_default());
    } else {
        output(&frame, false);
    }
}

fn print_failed_logs(manager: &ServiceManager, tail: usize) {
    if tail == 0 {
        return;
    }

    for instance in manager.instances() {
        if instance.status() != ServiceStatus::Error {
            continue;
        }

        let reason = instance.last_error().unwrap_or_else(|| "unknown error".to_string());
        println!("{}", action_failure(&format!("{}: {}", instance.name(), reason)));

        let lines = instance.logs().last_lines(tail);
        if lines.is_empty() {
            continue;
        }
        println!("{}", section_header(&format!("last {} lines of {}", lines.len(), instance.name())));
        for line in lines {
            println!("  {}", line.dimmed());
        }
    }
}
