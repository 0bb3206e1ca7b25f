//! Common test utilities for integration tests
//!
//! Provides an in-memory process launcher and process probe so the manager
//! and state layers can be driven without spawning real services.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use devhub::domain::errors::{ProbeError, ProcessError};
use devhub::domain::models::{HealthProbe, HealthSpec, HostStats, ResourceSample, Settings};
use devhub::domain::ports::{ProcessControl, ProcessExit, ProcessLauncher, ProcessProbe, SpawnedProcess};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Settings with short timings suited to tests.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.manager.dependency_timeout_ms = 2_000;
    settings.manager.health_poll_ms = 20;
    settings.manager.stop_timeout_ms = 200;
    settings.manager.shutdown_timeout_ms = 500;
    settings.manager.restart_delay_ms = 10;
    settings.state.status_interval_ms = 20;
    settings.state.resource_interval_ms = 20;
    settings.state.host_interval_ms = 20;
    settings.state.probe_timeout_ms = 200;
    settings
}

/// TCP health check against `port` on loopback that probes every 20ms.
pub fn tcp_health(port: u16) -> HealthSpec {
    HealthSpec::new(HealthProbe::Tcp {
        host: "127.0.0.1".to_string(),
        port,
    })
    .with_interval(Duration::from_millis(20))
    .with_timeout(Duration::from_millis(100))
    .with_start_period(Duration::ZERO)
    .with_retries(1)
}

/// A bound loopback listener, accepting nothing; connects still succeed.
pub async fn open_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let (listener, port) = open_port().await;
    drop(listener);
    port
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or the timeout is
/// reached. Returns whether the condition was met.
pub async fn wait_for<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

type ExitLog = Arc<Mutex<Vec<(String, Instant)>>>;

struct FakeControl {
    program: String,
    ignores_terminate: bool,
    exit_tx: Mutex<Option<oneshot::Sender<ProcessExit>>>,
    exits: ExitLog,
    kills: Arc<AtomicU32>,
}

impl FakeControl {
    fn finish(&self, exit: ProcessExit) {
        if let Some(tx) = self.exit_tx.lock().unwrap().take() {
            self.exits
                .lock()
                .unwrap()
                .push((self.program.clone(), Instant::now()));
            let _ = tx.send(exit);
        }
    }

    fn alive(&self) -> bool {
        self.exit_tx.lock().unwrap().is_some()
    }
}

impl ProcessControl for FakeControl {
    fn terminate(&self) -> Result<(), ProcessError> {
        if !self.ignores_terminate {
            self.finish(ProcessExit::with_code(0));
        }
        Ok(())
    }

    fn kill(&self) -> Result<(), ProcessError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.finish(ProcessExit {
            code: None,
            detail: "signal: 9 (SIGKILL)".to_string(),
        });
        Ok(())
    }
}

/// Launches nothing; records every spawn and hands out sequential pids.
///
/// Programs listed in `failing` fail to spawn. Every fake process prints
/// `<program> up` and runs until terminated or [`FakeLauncher::crash`]ed.
/// Programs marked with [`FakeLauncher::ignore_terminate`] only die on kill.
#[derive(Default)]
pub struct FakeLauncher {
    next_pid: AtomicU32,
    spawned: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    stubborn: Mutex<HashSet<String>>,
    running: Mutex<HashMap<String, Arc<FakeControl>>>,
    exits: ExitLog,
    kills: Arc<AtomicU32>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        })
    }

    pub fn fail(&self, program: &str) {
        self.failing.lock().unwrap().push(program.to_string());
    }

    /// Processes of `program` spawned from now on ignore terminate requests.
    pub fn ignore_terminate(&self, program: &str) {
        self.stubborn.lock().unwrap().insert(program.to_string());
    }

    /// Whether the most recent process for `program` is still running.
    pub fn alive(&self, program: &str) -> bool {
        self.running
            .lock()
            .unwrap()
            .get(program)
            .is_some_and(|control| control.alive())
    }

    /// When the most recent process for `program` exited.
    pub fn exited_at(&self, program: &str) -> Option<Instant> {
        self.exits
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == program)
            .map(|(_, at)| *at)
    }

    /// Kill requests received across all processes.
    pub fn kills(&self) -> u32 {
        self.kills.load(Ordering::SeqCst)
    }

    /// Programs spawned so far, in spawn order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    /// Make the most recent process for `program` exit with `code`.
    pub fn crash(&self, program: &str, code: i32) {
        if let Some(control) = self.running.lock().unwrap().remove(program) {
            control.finish(ProcessExit::with_code(code));
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn spawn(&self, argv: &[String]) -> Result<SpawnedProcess, ProcessError> {
        let program = argv[0].clone();
        if self.failing.lock().unwrap().contains(&program) {
            return Err(ProcessError::Spawn {
                program,
                reason: "No such file or directory".to_string(),
            });
        }

        let (out_tx, out_rx) = mpsc::channel(8);
        let _ = out_tx.try_send(format!("{program} up\n").into_bytes());
        let (exit_tx, exit_rx) = oneshot::channel();
        let control = Arc::new(FakeControl {
            program: program.clone(),
            ignores_terminate: self.stubborn.lock().unwrap().contains(&program),
            exit_tx: Mutex::new(Some(exit_tx)),
            exits: Arc::clone(&self.exits),
            kills: Arc::clone(&self.kills),
        });

        self.spawned.lock().unwrap().push(program.clone());
        self.running.lock().unwrap().insert(program, Arc::clone(&control));

        Ok(SpawnedProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            output: out_rx,
            exit: exit_rx,
            control,
        })
    }
}

/// Fixed per-pid readings; unknown pids fail the lookup.
///
/// Lookups for a pid marked with [`FakeProbe::hang`] block until
/// [`FakeProbe::release`] or a few seconds pass, like a stuck `/proc` read.
#[derive(Default)]
pub struct FakeProbe {
    usage: Mutex<HashMap<u32, ResourceSample>>,
    children: Mutex<HashMap<u32, Vec<u32>>>,
    hung: Mutex<HashSet<u32>>,
    refreshes: AtomicU32,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_usage(&self, pid: u32, cpu_percent: f64, memory_mb: f64) {
        self.usage.lock().unwrap().insert(
            pid,
            ResourceSample {
                cpu_percent,
                memory_mb,
            },
        );
    }

    /// Make lookups for `pid` fail from now on.
    pub fn forget(&self, pid: u32) {
        self.usage.lock().unwrap().remove(&pid);
    }

    /// Make lookups for `pid` block.
    pub fn hang(&self, pid: u32) {
        self.hung.lock().unwrap().insert(pid);
    }

    /// Unblock every hung lookup.
    pub fn release(&self) {
        self.hung.lock().unwrap().clear();
    }

    pub fn set_children(&self, pid: u32, children: Vec<u32>) {
        self.children.lock().unwrap().insert(pid, children);
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl ProcessProbe for FakeProbe {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn process_usage(&self, pid: u32) -> Result<ResourceSample, ProbeError> {
        let stuck_until = Instant::now() + Duration::from_secs(5);
        while self.hung.lock().unwrap().contains(&pid) && Instant::now() < stuck_until {
            std::thread::sleep(Duration::from_millis(10));
        }

        self.usage
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .ok_or(ProbeError::NotFound(pid))
    }

    fn child_pids(&self, pid: u32) -> Vec<u32> {
        self.children.lock().unwrap().get(&pid).cloned().unwrap_or_default()
    }

    fn host_stats(&self) -> Result<HostStats, ProbeError> {
        Ok(HostStats {
            cpu_percent: 12.5,
            memory_mb: 4096.0,
            memory_percent: 25.0,
        })
    }
}
