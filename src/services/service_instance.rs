//! Runtime state of one declared service.
//!
//! A [`ServiceInstance`] owns the spawned process, its captured output, and
//! its health monitor. It is a cheap clonable handle; all clones observe the
//! same process.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{ServiceError, ServiceResult};
use crate::domain::models::{
    HealthState, LogBufferSettings, ResourceSample, ServiceSnapshot, ServiceSpec, ServiceStatus,
};
use crate::domain::ports::{ProcessControl, ProcessExit, ProcessLauncher, ProcessProbe, SpawnedProcess};
use crate::services::health_checker::checker_for;
use crate::services::health_monitor::HealthMonitor;
use crate::services::log_buffer::CircularLogBuffer;
use crate::services::resources::sample_process_tree;

/// How long to wait for exit after a forced kill before giving up on it.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Construction options shared by every instance of a manager.
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub stop_timeout: Duration,
    pub log_buffer: LogBufferSettings,
    /// Parent scope for background health probing
    pub scope: CancellationToken,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            log_buffer: LogBufferSettings::default(),
            scope: CancellationToken::new(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceInstance {
    inner: Arc<Inner>,
}

struct Inner {
    spec: ServiceSpec,
    launcher: Arc<dyn ProcessLauncher>,
    logs: CircularLogBuffer,
    health: Option<HealthMonitor>,
    stop_timeout: Duration,
    scope: CancellationToken,
    state: Mutex<InstanceState>,
}

#[derive(Default)]
struct InstanceState {
    status: ServiceStatus,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    process: Option<RunningProcess>,
    /// Bumped on every spawn so late exit notifications from an earlier
    /// process are ignored.
    generation: u64,
}

struct RunningProcess {
    control: Arc<dyn ProcessControl>,
    exited: watch::Receiver<bool>,
    generation: u64,
}

impl InstanceState {
    fn mark_stopped(&mut self) {
        self.status = ServiceStatus::Stopped;
        self.pid = None;
        self.started_at = None;
        self.last_error = None;
        self.process = None;
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a confirmed exit of the process spawned as `generation`.
    fn finish_stop(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.generation == generation {
            state.mark_stopped();
        }
    }

    fn stop_health(&self) {
        if let Some(health) = &self.health {
            health.stop();
        }
    }
}

impl ServiceInstance {
    pub fn new(spec: ServiceSpec, launcher: Arc<dyn ProcessLauncher>, options: InstanceOptions) -> Self {
        let health = spec.health.as_ref().map(|health_spec| {
            let checker = checker_for(&health_spec.probe, health_spec.timeout);
            HealthMonitor::new(spec.name.clone(), checker, health_spec)
        });

        Self {
            inner: Arc::new(Inner {
                logs: CircularLogBuffer::from_settings(&options.log_buffer),
                spec,
                launcher,
                health,
                stop_timeout: options.stop_timeout,
                scope: options.scope,
                state: Mutex::new(InstanceState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.inner.spec
    }

    pub fn logs(&self) -> &CircularLogBuffer {
        &self.inner.logs
    }

    pub fn status(&self) -> ServiceStatus {
        self.inner.lock_state().status
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock_state().pid
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().started_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock_state().last_error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status() == ServiceStatus::Running
    }

    /// Current health verdict.
    ///
    /// A service without a health probe counts as healthy while running.
    pub fn health_state(&self) -> HealthState {
        match &self.inner.health {
            Some(monitor) => monitor.state(),
            None if self.is_running() => HealthState::Healthy,
            None => HealthState::Unknown,
        }
    }

    /// Mark the service as waiting on its dependencies.
    ///
    /// Has no effect on a service that is already active.
    pub fn mark_queued(&self) {
        let mut state = self.inner.lock_state();
        if !state.status.is_active() {
            state.status = ServiceStatus::Queued;
            state.last_error = None;
        }
    }

    /// Record a failure that happened outside the process itself, such as a
    /// dependency that never became healthy.
    pub fn mark_failed(&self, message: impl Into<String>) {
        let mut state = self.inner.lock_state();
        if !state.status.is_active() {
            state.status = ServiceStatus::Error;
            state.last_error = Some(message.into());
        }
    }

    /// Spawn the process and begin health probing.
    ///
    /// Returns immediately for a service that is already starting or running.
    pub async fn start(&self) -> ServiceResult<()> {
        let name = self.name().to_string();
        let argv = self.inner.spec.command_line();

        {
            let mut state = self.inner.lock_state();
            if matches!(state.status, ServiceStatus::Starting | ServiceStatus::Running) {
                debug!(service = %name, status = %state.status, "start skipped");
                return Ok(());
            }
            state.status = ServiceStatus::Starting;
            state.last_error = None;
        }

        info!(service = %name, command = %argv.join(" "), "starting service");

        let spawned = match self.inner.launcher.spawn(&argv).await {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(service = %name, error = %e, "failed to start service");
                let mut state = self.inner.lock_state();
                state.status = ServiceStatus::Error;
                state.last_error = Some(e.to_string());
                return Err(ServiceError::Start {
                    service: name,
                    source: e,
                });
            }
        };

        let SpawnedProcess {
            pid,
            output,
            exit,
            control,
        } = spawned;
        let (exited_tx, exited_rx) = watch::channel(false);

        let generation = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            let generation = state.generation;
            state.status = ServiceStatus::Running;
            state.pid = Some(pid);
            state.started_at = Some(Utc::now());
            state.process = Some(RunningProcess {
                control,
                exited: exited_rx,
                generation,
            });
            generation
        };

        self.spawn_output_pump(output);
        self.spawn_exit_watcher(exit, exited_tx, generation);

        if let Some(health) = &self.inner.health {
            health.start(&self.inner.scope);
        }

        info!(service = %name, pid, "service started");
        Ok(())
    }

    fn spawn_output_pump(&self, mut output: mpsc::Receiver<Vec<u8>>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                inner.logs.write(&chunk);
            }
        });
    }

    fn spawn_exit_watcher(
        &self,
        exit: oneshot::Receiver<ProcessExit>,
        exited_tx: watch::Sender<bool>,
        generation: u64,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let exit = exit.await.unwrap_or_else(|_| ProcessExit::unknown());
            let _ = exited_tx.send(true);

            let unexpected = {
                let mut state = inner.lock_state();
                if state.generation != generation {
                    false
                } else if state.status == ServiceStatus::Stopping {
                    state.mark_stopped();
                    false
                } else {
                    state.status = ServiceStatus::Error;
                    state.last_error = Some(format!("process exited unexpectedly ({exit})"));
                    state.pid = None;
                    state.started_at = None;
                    state.process = None;
                    true
                }
            };

            if unexpected {
                inner.stop_health();
                warn!(service = %inner.spec.name, exit = %exit, "service exited unexpectedly");
            } else {
                debug!(service = %inner.spec.name, exit = %exit, "service process exited");
            }
        });
    }

    /// Terminate the process, escalating to a kill after the stop timeout.
    ///
    /// Leaves the service `Stopped` once exit is confirmed. A process that
    /// survives the kill stays `Stopping` and is retried by the next stop.
    pub async fn stop(&self) -> ServiceResult<()> {
        self.stop_within(self.inner.stop_timeout).await
    }

    /// [`ServiceInstance::stop`] with an explicit grace period before the kill.
    pub async fn stop_within(&self, grace: Duration) -> ServiceResult<()> {
        let name = self.name().to_string();

        // the process stays recorded until exit is confirmed, so a stop that
        // is abandoned mid-wait can be picked up by the next one
        let running = {
            let mut state = self.inner.lock_state();
            match &state.process {
                Some(process) => {
                    let handle = (
                        Arc::clone(&process.control),
                        process.exited.clone(),
                        process.generation,
                    );
                    state.status = ServiceStatus::Stopping;
                    Some(handle)
                }
                None => {
                    state.mark_stopped();
                    None
                }
            }
        };

        self.inner.stop_health();

        let Some((control, mut exited, generation)) = running else {
            return Ok(());
        };

        info!(service = %name, "stopping service");
        if let Err(e) = control.terminate() {
            debug!(service = %name, error = %e, "terminate signal failed");
        }

        if !wait_for_exit(&mut exited, grace).await {
            warn!(
                service = %name,
                timeout = ?grace,
                "service did not exit in time, killing"
            );
            if let Err(e) = control.kill() {
                warn!(service = %name, error = %e, "kill signal failed");
            }
            if !wait_for_exit(&mut exited, KILL_GRACE).await {
                error!(service = %name, "service did not exit after kill");
                return Err(ServiceError::StopTimeout { service: name });
            }
        }

        self.inner.finish_stop(generation);

        info!(service = %name, "service stopped");
        Ok(())
    }

    /// Summed usage of the process tree, or `None` when nothing is running
    /// or the process table could not be read.
    ///
    /// Blocking; the probe must have been refreshed beforehand.
    pub fn resource_usage(&self, probe: &dyn ProcessProbe) -> Option<ResourceSample> {
        let pid = self.pid()?;
        sample_process_tree(probe, pid)
    }

    /// Point-in-time copy with zeroed resource figures.
    pub fn snapshot(&self) -> ServiceSnapshot {
        let (status, pid, started_at, error) = {
            let state = self.inner.lock_state();
            (state.status, state.pid, state.started_at, state.last_error.clone())
        };
        let spec = &self.inner.spec;

        ServiceSnapshot {
            name: spec.name.clone(),
            description: spec.description.clone(),
            status,
            port: spec.port,
            pid,
            started_at,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            health: self.health_state(),
            depends_on: spec.needs.clone(),
            error,
            last_update: Utc::now(),
        }
    }
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// True once the watcher has observed exit. A dropped watcher counts as exited.
async fn wait_for_exit(exited: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, exited.wait_for(|done| *done)).await,
        Ok(_)
    )
}
