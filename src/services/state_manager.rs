//! Non-blocking state publication.
//!
//! Three producers poll on independent cadences:
//! - status: cheap copies of every instance's lifecycle fields
//! - resources: per-process CPU/memory, fanned out and bounded per cycle
//! - host: machine-wide CPU/memory
//!
//! One consumer applies their updates to a single snapshot table. Readers only
//! ever take that table's lock long enough to copy it, so a slow probe never
//! blocks a query.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::models::{HostStats, ResourceSample, ServiceSnapshot, StateSettings};
use crate::domain::ports::ProcessProbe;
use crate::services::service_manager::ServiceManager;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Resource reading for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUpdate {
    pub name: String,
    pub pid: Option<u32>,
    /// `None` when the probe could not read the process tree
    pub sample: Option<ResourceSample>,
}

/// Snapshots keyed by service, in manager order, plus host figures.
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    services: Vec<ServiceSnapshot>,
    index: HashMap<String, usize>,
    host: HostStats,
}

impl StateTable {
    pub fn new(services: Vec<ServiceSnapshot>) -> Self {
        let index = services
            .iter()
            .enumerate()
            .map(|(i, snapshot)| (snapshot.name.clone(), i))
            .collect();
        Self {
            services,
            index,
            host: HostStats::default(),
        }
    }

    pub fn services(&self) -> &[ServiceSnapshot] {
        &self.services
    }

    pub fn host(&self) -> HostStats {
        self.host
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSnapshot> {
        self.index.get(name).map(|&i| &self.services[i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ServiceSnapshot> {
        self.index.get(name).map(|&i| &mut self.services[i])
    }

    /// Merge a status-only snapshot.
    ///
    /// Resource figures survive unless the process is gone, in which case pid
    /// and usage are cleared together.
    pub fn apply_status(&mut self, update: ServiceSnapshot) {
        let Some(current) = self.get_mut(&update.name) else {
            trace!(service = %update.name, "status update for unknown service");
            return;
        };

        let (cpu_percent, memory_mb) = match update.pid {
            Some(_) => (current.cpu_percent, current.memory_mb),
            None => (0.0, 0.0),
        };

        *current = ServiceSnapshot {
            cpu_percent,
            memory_mb,
            ..update
        };
    }

    /// Merge a resource reading.
    ///
    /// A present pid is always applied. Usage is applied only for a successful
    /// read, so a failed probe never replaces the last known reading. Readings
    /// for a service that is no longer active are discarded.
    pub fn apply_resources(&mut self, update: ResourceUpdate) {
        let Some(current) = self.get_mut(&update.name) else {
            return;
        };
        if !current.status.is_active() {
            return;
        }

        if let Some(pid) = update.pid {
            current.pid = Some(pid);
        }
        if let Some(sample) = update.sample {
            current.cpu_percent = sample.cpu_percent;
            current.memory_mb = sample.memory_mb;
        }
    }

    pub fn apply_host(&mut self, host: HostStats) {
        self.host = host;
    }
}

/// Bounded queues from the producers to the consumer.
struct Queues {
    status: mpsc::Receiver<Vec<ServiceSnapshot>>,
    resources: mpsc::Receiver<Vec<ResourceUpdate>>,
    host: mpsc::Receiver<HostStats>,
}

/// Publishes service and host state sampled in the background.
pub struct StateManager {
    manager: Arc<ServiceManager>,
    probe: Arc<dyn ProcessProbe>,
    settings: StateSettings,
    table: Arc<RwLock<StateTable>>,
    token: CancellationToken,
    status_tx: mpsc::Sender<Vec<ServiceSnapshot>>,
    resources_tx: mpsc::Sender<Vec<ResourceUpdate>>,
    host_tx: mpsc::Sender<HostStats>,
    queues: Mutex<Option<Queues>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StateManager {
    /// Seed the table from the manager's current state. Nothing is polled
    /// until [`StateManager::start`].
    pub fn new(manager: Arc<ServiceManager>, probe: Arc<dyn ProcessProbe>, settings: StateSettings) -> Self {
        let capacity = settings.queue_capacity.max(1);
        let (status_tx, status_rx) = mpsc::channel(capacity);
        let (resources_tx, resources_rx) = mpsc::channel(capacity);
        let (host_tx, host_rx) = mpsc::channel(capacity);

        Self {
            table: Arc::new(RwLock::new(StateTable::new(manager.services()))),
            token: manager.scope().child_token(),
            manager,
            probe,
            settings,
            status_tx,
            resources_tx,
            host_tx,
            queues: Mutex::new(Some(Queues {
                status: status_rx,
                resources: resources_rx,
                host: host_rx,
            })),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, StateTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every service snapshot, in manager order.
    pub fn services(&self) -> Vec<ServiceSnapshot> {
        self.read_table().services.clone()
    }

    pub fn service(&self, name: &str) -> Option<ServiceSnapshot> {
        self.read_table().get(name).cloned()
    }

    pub fn host_stats(&self) -> HostStats {
        self.read_table().host
    }

    /// Queue an immediate status update for one service.
    ///
    /// Never blocks; the request is dropped when the queue is full.
    pub fn refresh_service(&self, name: &str) {
        let Some(instance) = self.manager.instance(name) else {
            return;
        };
        if self.status_tx.try_send(vec![instance.snapshot()]).is_err() {
            debug!(service = %name, "status queue full, refresh dropped");
        }
    }

    /// Spawn the three producers and the consumer. Later calls are no-ops.
    pub fn start(&self) {
        let Some(queues) = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let handles = vec![
            tokio::spawn(consume(Arc::clone(&self.table), queues, self.token.clone())),
            tokio::spawn(poll_status(
                Arc::clone(&self.manager),
                self.status_tx.clone(),
                self.settings.status_interval(),
                self.token.clone(),
            )),
            tokio::spawn(poll_resources(
                Arc::clone(&self.manager),
                Arc::clone(&self.probe),
                self.resources_tx.clone(),
                self.settings.clone(),
                self.token.clone(),
            )),
            tokio::spawn(poll_host(
                Arc::clone(&self.probe),
                self.host_tx.clone(),
                self.settings.clone(),
                self.token.clone(),
            )),
        ];

        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = handles;
        info!("state manager started");
    }

    /// Cancel the polling tasks and wait for them to exit.
    pub async fn stop(&self) {
        self.token.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "state task failed");
                }
            }
        }
        debug!("state manager stopped");
    }
}

impl Drop for StateManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn consume(table: Arc<RwLock<StateTable>>, mut queues: Queues, token: CancellationToken) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            Some(batch) = queues.status.recv() => {
                let mut table = write_table(&table);
                for snapshot in batch {
                    table.apply_status(snapshot);
                }
            }
            Some(batch) = queues.resources.recv() => {
                let mut table = write_table(&table);
                for update in batch {
                    table.apply_resources(update);
                }
            }
            Some(host) = queues.host.recv() => write_table(&table).apply_host(host),
            else => break,
        }
    }
}

fn write_table(table: &RwLock<StateTable>) -> RwLockWriteGuard<'_, StateTable> {
    table.write().unwrap_or_else(PoisonError::into_inner)
}

async fn poll_status(
    manager: Arc<ServiceManager>,
    tx: mpsc::Sender<Vec<ServiceSnapshot>>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(period.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let batch = manager.services();
        tokio::select! {
            () = token.cancelled() => break,
            sent = tx.send(batch) => if sent.is_err() { break },
        }
    }
}

async fn poll_resources(
    manager: Arc<ServiceManager>,
    probe: Arc<dyn ProcessProbe>,
    tx: mpsc::Sender<Vec<ResourceUpdate>>,
    settings: StateSettings,
    token: CancellationToken,
) {
    let mut ticker = interval(settings.resource_interval().max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let batch = tokio::select! {
            () = token.cancelled() => break,
            batch = sample_running(&manager, &probe, settings.probe_timeout()) => batch,
        };
        if batch.is_empty() {
            continue;
        }

        tokio::select! {
            () = token.cancelled() => break,
            sent = tx.send(batch) => if sent.is_err() { break },
        }
    }
}

/// One resource cycle: refresh the process table, then probe every running
/// service concurrently. Probes still pending when `limit` elapses are
/// dropped from this cycle.
async fn sample_running(
    manager: &ServiceManager,
    probe: &Arc<dyn ProcessProbe>,
    limit: Duration,
) -> Vec<ResourceUpdate> {
    let running: Vec<_> = manager
        .instances()
        .into_iter()
        .filter(|instance| instance.is_running())
        .collect();
    if running.is_empty() {
        return Vec::new();
    }

    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);

    let refresh = {
        let probe = Arc::clone(probe);
        tokio::task::spawn_blocking(move || probe.refresh())
    };
    tokio::select! {
        () = &mut deadline => {
            debug!("process table refresh timed out");
            return Vec::new();
        }
        _ = refresh => {}
    }

    let mut probes = JoinSet::new();
    for instance in running {
        let probe = Arc::clone(probe);
        probes.spawn_blocking(move || ResourceUpdate {
            name: instance.name().to_string(),
            pid: instance.pid(),
            sample: instance.resource_usage(probe.as_ref()),
        });
    }

    let mut updates = Vec::with_capacity(probes.len());
    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!(dropped = probes.len(), "resource probes timed out");
                break;
            }
            next = probes.join_next() => match next {
                Some(Ok(update)) => updates.push(update),
                Some(Err(e)) => debug!(error = %e, "resource probe failed"),
                None => break,
            },
        }
    }

    updates
}

async fn poll_host(
    probe: Arc<dyn ProcessProbe>,
    tx: mpsc::Sender<HostStats>,
    settings: StateSettings,
    token: CancellationToken,
) {
    let mut ticker = interval(settings.host_interval().max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sample = {
            let probe = Arc::clone(&probe);
            tokio::task::spawn_blocking(move || probe.host_stats())
        };
        let stats = tokio::select! {
            () = token.cancelled() => break,
            result = tokio::time::timeout(settings.probe_timeout(), sample) => result,
        };

        let stats = match stats {
            Ok(Ok(Ok(stats))) => stats,
            Ok(Ok(Err(e))) => {
                debug!(error = %e, "host stats unavailable");
                continue;
            }
            Ok(Err(e)) => {
                debug!(error = %e, "host stats task failed");
                continue;
            }
            Err(_) => {
                debug!("host stats timed out");
                continue;
            }
        };

        tokio::select! {
            () = token.cancelled() => break,
            sent = tx.send(stats) => if sent.is_err() { break },
        }
    }
}
