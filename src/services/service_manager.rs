//! Dependency-ordered start and stop cascades over a fixed set of services.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{ManagerError, ServiceError, ServiceResult};
use crate::domain::models::{
    HealthState, ManagerSettings, ServiceConfig, ServiceSnapshot, ServiceSpec, ServiceStatus,
    Settings,
};
use crate::domain::ports::ProcessLauncher;
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::service_instance::{InstanceOptions, ServiceInstance};

/// Instances sorted by name, plus a name index into that order.
#[derive(Default)]
struct ServiceTable {
    ordered: Vec<ServiceInstance>,
    by_name: HashMap<String, usize>,
}

/// Owns every [`ServiceInstance`] and runs start/stop cascades across them.
///
/// Cascades copy the instance handles they need out of the table and release
/// the lock before any await, so a slow dependency wait never stalls a status
/// query.
pub struct ServiceManager {
    table: RwLock<ServiceTable>,
    resolver: DependencyResolver,
    start_order: Vec<String>,
    settings: ManagerSettings,
    scope: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceManager {
    /// Validate the declarations, resolve the start order, and create one
    /// stopped instance per service.
    ///
    /// Any invalid declaration, duplicate name, missing dependency, or cycle
    /// aborts construction.
    pub fn new(
        specs: Vec<ServiceSpec>,
        launcher: Arc<dyn ProcessLauncher>,
        settings: &Settings,
    ) -> Result<Self, ManagerError> {
        for spec in &specs {
            spec.validate()?;
        }

        let mut specs = specs;
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = specs.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(ManagerError::DuplicateService(pair[0].name.clone()));
        }

        let resolver = DependencyResolver::new(&specs);
        let start_order = resolver.start_order()?;

        let scope = CancellationToken::new();
        let options = InstanceOptions {
            stop_timeout: settings.manager.stop_timeout(),
            log_buffer: settings.log_buffer.clone(),
            scope: scope.clone(),
        };

        let ordered: Vec<ServiceInstance> = specs
            .into_iter()
            .map(|spec| ServiceInstance::new(spec, Arc::clone(&launcher), options.clone()))
            .collect();
        let by_name = ordered
            .iter()
            .enumerate()
            .map(|(index, instance)| (instance.name().to_string(), index))
            .collect();

        info!(services = ordered.len(), order = ?start_order, "service manager ready");

        Ok(Self {
            table: RwLock::new(ServiceTable { ordered, by_name }),
            resolver,
            start_order,
            settings: settings.manager.clone(),
            scope,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Build from a parsed services file.
    pub fn from_config(
        services: &BTreeMap<String, ServiceConfig>,
        launcher: Arc<dyn ProcessLauncher>,
        settings: &Settings,
    ) -> Result<Self, ManagerError> {
        let specs = services
            .iter()
            .map(|(name, config)| ServiceSpec::from_config(name, config))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(specs, launcher, settings)
    }

    fn read_table(&self) -> RwLockReadGuard<'_, ServiceTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_order(&self) -> &[String] {
        &self.start_order
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Cancellation scope covering every background task of this manager.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.read_table().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().ordered.is_empty()
    }

    pub fn instance(&self, name: &str) -> Option<ServiceInstance> {
        let table = self.read_table();
        table.by_name.get(name).map(|&i| table.ordered[i].clone())
    }

    pub fn instance_at(&self, index: usize) -> Option<ServiceInstance> {
        self.read_table().ordered.get(index).cloned()
    }

    /// Handles to every instance, sorted by name.
    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.read_table().ordered.clone()
    }

    /// Status-only snapshots of every service, sorted by name.
    pub fn services(&self) -> Vec<ServiceSnapshot> {
        self.read_table()
            .ordered
            .iter()
            .map(ServiceInstance::snapshot)
            .collect()
    }

    fn lookup_all(&self, names: &[String]) -> Vec<ServiceInstance> {
        let table = self.read_table();
        names
            .iter()
            .filter_map(|name| table.by_name.get(name).map(|&i| table.ordered[i].clone()))
            .collect()
    }

    /// Start `name` after its dependencies.
    ///
    /// Each dependency that is not already running is started and must report
    /// healthy within the dependency deadline before the next one starts. On
    /// failure the services still waiting in the cascade move to `Error` and
    /// the requested service is never started.
    pub async fn start_service(&self, name: &str) -> ServiceResult<()> {
        if self.instance(name).is_none() {
            return Err(ServiceError::NotFound(name.to_string()));
        }
        if self.scope.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let mut plan = self.resolver.dependency_closure(name);
        plan.push(name.to_string());
        let cascade = self.lookup_all(&plan);

        for instance in &cascade {
            instance.mark_queued();
        }

        debug!(service = %name, cascade = ?plan, "starting with dependencies");

        let last = cascade.len().saturating_sub(1);
        for (position, instance) in cascade.iter().enumerate() {
            if instance.is_running() {
                continue;
            }

            let outcome = match instance.start().await {
                Ok(()) if position < last => self.wait_for_healthy(name, instance).await,
                other => other,
            };

            if let Err(e) = outcome {
                error!(service = %name, dependency = %instance.name(), error = %e, "start cascade failed");
                fail_queued(&cascade[position + 1..], &e);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Poll `dependency` until it reports healthy, the deadline passes, or the
    /// manager shuts down.
    async fn wait_for_healthy(&self, service: &str, dependency: &ServiceInstance) -> ServiceResult<()> {
        let timeout = self.settings.dependency_timeout();
        let deadline = Instant::now() + timeout;
        let mut tick = interval(self.settings.health_poll());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(service = %service, dependency = %dependency.name(), "waiting for dependency health");

        loop {
            tokio::select! {
                () = self.scope.cancelled() => return Err(ServiceError::Cancelled),
                _ = tick.tick() => {}
            }

            if dependency.health_state() == HealthState::Healthy {
                debug!(dependency = %dependency.name(), "dependency is healthy");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ServiceError::HealthTimeout {
                    service: service.to_string(),
                    dependency: dependency.name().to_string(),
                    timeout,
                });
            }
        }
    }

    /// Stop every service that transitively needs `name`, deepest first, then
    /// `name` itself.
    pub async fn stop_service(&self, name: &str) -> ServiceResult<()> {
        let target = self
            .instance(name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;

        let dependents = self.lookup_all(&self.resolver.transitive_dependents(name));
        for dependent in dependents {
            if dependent.status().is_active() {
                debug!(service = %name, dependent = %dependent.name(), "stopping dependent");
                dependent.stop().await?;
            }
        }

        target.stop().await
    }

    /// Stop `name` if it is running, pause, then start it with its dependencies.
    ///
    /// Services that need `name` are left alone.
    pub async fn restart_service(&self, name: &str) -> ServiceResult<()> {
        let target = self
            .instance(name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;

        if target.is_running() {
            target.stop().await?;
            tokio::select! {
                () = self.scope.cancelled() => return Err(ServiceError::Cancelled),
                () = tokio::time::sleep(self.settings.restart_delay()) => {}
            }
        }

        self.start_service(name).await
    }

    /// Start every service in resolved order, continuing past failures.
    ///
    /// Returns the failures keyed by the service whose start was requested.
    pub async fn start_all(&self) -> Vec<(String, ServiceError)> {
        let mut failures = Vec::new();

        for name in &self.start_order {
            if self.scope.is_cancelled() {
                break;
            }
            if self.instance(name).is_some_and(|i| i.status() == ServiceStatus::Error) {
                continue;
            }
            if let Err(e) = self.start_service(name).await {
                warn!(service = %name, error = %e, "service failed to start");
                failures.push((name.clone(), e));
            }
        }

        failures
    }

    /// Start or stop the service at `index`, whichever flips its state.
    ///
    /// Runs in the background; the outcome is observed through later
    /// snapshots. Out-of-range indices are ignored.
    pub fn toggle_service(self: &Arc<Self>, index: usize) {
        let Some(instance) = self.instance_at(index) else {
            return;
        };

        if instance.is_running() {
            self.request_stop(index);
        } else {
            self.request_start(index);
        }
    }

    /// Start the service at `index` in the background.
    pub fn request_start(self: &Arc<Self>, index: usize) {
        if let Some(instance) = self.instance_at(index) {
            let name = instance.name().to_string();
            self.spawn_command(move |manager: Arc<Self>| async move {
                manager.start_service(&name).await.map_err(|e| (name, e))
            });
        }
    }

    /// Stop the service at `index` and its dependents in the background.
    pub fn request_stop(self: &Arc<Self>, index: usize) {
        if let Some(instance) = self.instance_at(index) {
            let name = instance.name().to_string();
            self.spawn_command(move |manager: Arc<Self>| async move {
                manager.stop_service(&name).await.map_err(|e| (name, e))
            });
        }
    }

    /// Restart the service at `index` in the background.
    pub fn request_restart(self: &Arc<Self>, index: usize) {
        if let Some(instance) = self.instance_at(index) {
            let name = instance.name().to_string();
            self.spawn_command(move |manager: Arc<Self>| async move {
                manager.restart_service(&name).await.map_err(|e| (name, e))
            });
        }
    }

    fn spawn_command<F, Fut>(self: &Arc<Self>, command: F)
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<(), (String, ServiceError)>> + Send + 'static,
    {
        if self.scope.is_cancelled() {
            return;
        }

        let future = command(Arc::clone(self));
        let handle = tokio::spawn(async move {
            if let Err((service, e)) = future.await {
                warn!(service = %service, error = %e, "background command failed");
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Whole captured output of the service at `index`. Empty when out of range.
    pub fn logs(&self, index: usize) -> Vec<u8> {
        self.instance_at(index)
            .map(|instance| instance.logs().bytes())
            .unwrap_or_default()
    }

    /// Trailing `n` bytes of output of the service at `index`.
    pub fn log_tail(&self, index: usize, n: usize) -> Vec<u8> {
        self.instance_at(index)
            .map(|instance| instance.logs().last_bytes(n))
            .unwrap_or_default()
    }

    /// Last `n` output lines of the service at `index`.
    pub fn log_lines(&self, index: usize, n: usize) -> Vec<String> {
        self.instance_at(index)
            .map(|instance| instance.logs().last_lines(n))
            .unwrap_or_default()
    }

    pub fn clear_logs(&self, index: usize) {
        if let Some(instance) = self.instance_at(index) {
            instance.logs().clear();
        }
    }

    /// Cancel background activity, then stop every active service.
    ///
    /// Services stop concurrently, each bounded by the shutdown timeout after
    /// which it is killed.
    pub async fn shutdown(&self) {
        info!("shutting down service manager");
        self.scope.cancel();

        let pending: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let grace = self.settings.shutdown_timeout();
        for task in pending {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("background command did not finish during shutdown, aborting");
                abort.abort();
            }
        }

        let active: Vec<ServiceInstance> = self
            .instances()
            .into_iter()
            .filter(|instance| instance.status().is_active())
            .collect();

        join_all(active.iter().map(|instance| stop_bounded(instance, grace))).await;
        info!("service manager shut down");
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

async fn stop_bounded(instance: &ServiceInstance, grace: Duration) {
    // stop_within escalates to a kill after `grace`; the outer bound covers a
    // process that survives even that
    let limit = grace + Duration::from_secs(5);
    match tokio::time::timeout(limit, instance.stop_within(grace)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(service = %instance.name(), error = %e, "failed to stop service"),
        Err(_) => error!(service = %instance.name(), "service did not stop during shutdown"),
    }
}

fn fail_queued(remaining: &[ServiceInstance], cause: &ServiceError) {
    for instance in remaining {
        if instance.status() == ServiceStatus::Queued {
            instance.mark_failed(cause.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ConfigError, DependencyError, ProcessError};
    use crate::domain::ports::SpawnedProcess;
    use async_trait::async_trait;

    struct RefusingLauncher;

    #[async_trait]
    impl ProcessLauncher for RefusingLauncher {
        async fn spawn(&self, argv: &[String]) -> Result<SpawnedProcess, ProcessError> {
            Err(ProcessError::Spawn {
                program: argv[0].clone(),
                reason: "refused".to_string(),
            })
        }
    }

    fn manager(specs: Vec<ServiceSpec>) -> Result<ServiceManager, ManagerError> {
        ServiceManager::new(specs, Arc::new(RefusingLauncher), &Settings::default())
    }

    #[test]
    fn test_construction_resolves_order_and_sorts_instances() {
        let manager = manager(vec![
            ServiceSpec::new("worker", "work").with_needs(["api"]),
            ServiceSpec::new("api", "serve").with_needs(["db"]),
            ServiceSpec::new("db", "postgres"),
        ])
        .unwrap();

        assert_eq!(manager.start_order(), ["db", "api", "worker"]);
        let names: Vec<_> = manager.services().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["api", "db", "worker"]);
        assert!(manager
            .services()
            .iter()
            .all(|s| s.status == ServiceStatus::Stopped));
    }

    #[test]
    fn test_construction_rejects_bad_graphs() {
        let cycle = manager(vec![
            ServiceSpec::new("a", "run").with_needs(["b"]),
            ServiceSpec::new("b", "run").with_needs(["a"]),
        ]);
        assert!(matches!(
            cycle,
            Err(ManagerError::Dependency(DependencyError::Cycle { .. }))
        ));

        let missing = manager(vec![ServiceSpec::new("a", "run").with_needs(["ghost"])]);
        assert!(matches!(
            missing,
            Err(ManagerError::Dependency(DependencyError::MissingDependency { .. }))
        ));

        let empty = manager(vec![ServiceSpec::new("a", "  ")]);
        assert!(matches!(
            empty,
            Err(ManagerError::Config(ConfigError::EmptyCommand { .. }))
        ));

        let duplicate = manager(vec![ServiceSpec::new("a", "x"), ServiceSpec::new("a", "y")]);
        assert!(matches!(duplicate, Err(ManagerError::DuplicateService(name)) if name == "a"));
    }

    #[tokio::test]
    async fn test_spawn_failure_fails_queued_dependents() {
        let manager = manager(vec![
            ServiceSpec::new("db", "postgres"),
            ServiceSpec::new("api", "serve").with_needs(["db"]),
        ])
        .unwrap();

        let err = manager.start_service("api").await.unwrap_err();
        assert!(matches!(err, ServiceError::Start { ref service, .. } if service == "db"));

        let api = manager.instance("api").unwrap();
        assert_eq!(api.status(), ServiceStatus::Error);
        assert!(api.last_error().unwrap().contains("db"));
        assert_eq!(manager.instance("db").unwrap().status(), ServiceStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_names_and_indices() {
        let manager = manager(vec![ServiceSpec::new("db", "postgres")]).unwrap();

        assert_eq!(
            manager.start_service("nope").await,
            Err(ServiceError::NotFound("nope".to_string()))
        );
        assert_eq!(
            manager.stop_service("nope").await,
            Err(ServiceError::NotFound("nope".to_string()))
        );
        assert!(manager.logs(7).is_empty());
        assert!(manager.log_lines(7, 10).is_empty());
        assert!(manager.log_tail(7, 10).is_empty());
        manager.clear_logs(7);

        let manager = Arc::new(manager);
        manager.toggle_service(7);
        manager.request_restart(7);
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_cancelled() {
        let manager = manager(vec![ServiceSpec::new("db", "postgres")]).unwrap();
        manager.shutdown().await;

        assert!(manager.scope().is_cancelled());
        assert_eq!(manager.start_service("db").await, Err(ServiceError::Cancelled));
    }
}
