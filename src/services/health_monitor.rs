//! Periodic health probing with anti-flap hysteresis.

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::models::{HealthCheckResult, HealthSpec, HealthState};
use crate::domain::ports::HealthChecker;

/// Hysteresis state machine over probe outcomes.
///
/// Outcomes observed during the start period are ignored. The state flips only
/// after `retries` consecutive identical outcomes and is sticky otherwise.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    retries: u32,
    start_period: Duration,
    started_at: Instant,
    consecutive_successes: u32,
    consecutive_failures: u32,
    state: HealthState,
}

impl HealthTracker {
    pub fn new(retries: u32, start_period: Duration, started_at: Instant) -> Self {
        Self {
            retries: retries.max(1),
            start_period,
            started_at,
            consecutive_successes: 0,
            consecutive_failures: 0,
            state: HealthState::Unknown,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn in_start_period(&self, at: Instant) -> bool {
        at.saturating_duration_since(self.started_at) < self.start_period
    }

    /// Record one probe outcome. Returns the new state when it flips.
    pub fn record(&mut self, healthy: bool, at: Instant) -> Option<HealthState> {
        if self.in_start_period(at) {
            return None;
        }

        let target = if healthy {
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            self.consecutive_failures = 0;
            (self.consecutive_successes >= self.retries).then_some(HealthState::Healthy)
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.consecutive_successes = 0;
            (self.consecutive_failures >= self.retries).then_some(HealthState::Unhealthy)
        };

        match target {
            Some(state) if state != self.state => {
                self.state = state;
                Some(state)
            }
            _ => None,
        }
    }
}

/// Runs a [`HealthChecker`] on an interval while its service is running.
pub struct HealthMonitor {
    service: String,
    checker: Arc<dyn HealthChecker>,
    interval: Duration,
    timeout: Duration,
    start_period: Duration,
    retries: u32,
    result: Arc<RwLock<HealthCheckResult>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HealthMonitor {
    pub fn new(service: impl Into<String>, checker: Arc<dyn HealthChecker>, spec: &HealthSpec) -> Self {
        Self {
            service: service.into(),
            checker,
            interval: spec.interval.max(Duration::from_millis(1)),
            timeout: spec.timeout,
            start_period: spec.start_period,
            retries: spec.retries.max(1),
            result: Arc::new(RwLock::new(HealthCheckResult::unknown())),
            task: Mutex::new(None),
        }
    }

    /// Latest verdict.
    pub fn result(&self) -> HealthCheckResult {
        *self.result.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> HealthState {
        self.result().state
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Reset to `Unknown` and start probing. Restarts any previous loop.
    ///
    /// The loop ends when `scope` is cancelled or [`HealthMonitor::stop`] is
    /// called.
    pub fn start(&self, scope: &CancellationToken) {
        self.stop();

        let token = scope.child_token();
        let handle = tokio::spawn(probe_loop(
            self.service.clone(),
            Arc::clone(&self.checker),
            Arc::clone(&self.result),
            token.clone(),
            ProbeTiming {
                interval: self.interval,
                timeout: self.timeout,
                start_period: self.start_period,
                retries: self.retries,
            },
        ));

        debug!(service = %self.service, probe = %self.checker.describe(), "health monitor started");
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some((token, handle));
    }

    /// Stop probing and reset to `Unknown`.
    pub fn stop(&self) {
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, _handle)) = previous {
            token.cancel();
        }

        *self.result.write().unwrap_or_else(PoisonError::into_inner) = HealthCheckResult::unknown();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some((token, _)) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            token.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeTiming {
    interval: Duration,
    timeout: Duration,
    start_period: Duration,
    retries: u32,
}

async fn probe_loop(
    service: String,
    checker: Arc<dyn HealthChecker>,
    result: Arc<RwLock<HealthCheckResult>>,
    token: CancellationToken,
    timing: ProbeTiming,
) {
    let mut tracker = HealthTracker::new(timing.retries, timing.start_period, Instant::now());
    let mut ticker = interval(timing.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            () = token.cancelled() => break,
            outcome = tokio::time::timeout(timing.timeout, checker.check()) => outcome,
        };

        let healthy = match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(service = %service, error = %e, "health probe failed");
                false
            }
            Err(_) => {
                debug!(service = %service, timeout = ?timing.timeout, "health probe timed out");
                false
            }
        };

        let flipped = tracker.record(healthy, Instant::now());

        {
            let mut current = result.write().unwrap_or_else(PoisonError::into_inner);
            if token.is_cancelled() {
                break;
            }
            *current = HealthCheckResult {
                state: tracker.state(),
                as_of: Utc::now(),
            };
        }

        match flipped {
            Some(HealthState::Healthy) => info!(service = %service, "service is healthy"),
            Some(HealthState::Unhealthy) => warn!(service = %service, "service is unhealthy"),
            _ => {}
        }
    }

    debug!(service = %service, "health monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::HealthCheckError;
    use crate::domain::models::HealthProbe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn tracker(retries: u32, start_period: Duration) -> (HealthTracker, Instant) {
        let now = Instant::now();
        (HealthTracker::new(retries, start_period, now), now)
    }

    #[tokio::test]
    async fn test_tracker_ignores_start_period() {
        let (mut tracker, t0) = tracker(1, Duration::from_secs(10));

        assert_eq!(tracker.record(false, t0 + Duration::from_secs(1)), None);
        assert_eq!(tracker.record(true, t0 + Duration::from_secs(9)), None);
        assert_eq!(tracker.state(), HealthState::Unknown);

        assert_eq!(
            tracker.record(true, t0 + Duration::from_secs(10)),
            Some(HealthState::Healthy)
        );
    }

    #[tokio::test]
    async fn test_tracker_needs_consecutive_failures() {
        let (mut tracker, t0) = tracker(3, Duration::ZERO);

        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.state(), HealthState::Unknown);
        assert_eq!(tracker.record(false, t0), Some(HealthState::Unhealthy));
        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.state(), HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_tracker_single_blip_does_not_flip() {
        let (mut tracker, t0) = tracker(3, Duration::ZERO);
        for _ in 0..3 {
            tracker.record(true, t0);
        }
        assert_eq!(tracker.state(), HealthState::Healthy);

        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.record(true, t0), None);
        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.state(), HealthState::Healthy);
    }

    #[tokio::test]
    async fn test_tracker_recovers_after_consecutive_successes() {
        let (mut tracker, t0) = tracker(2, Duration::ZERO);
        tracker.record(false, t0);
        tracker.record(false, t0);
        assert_eq!(tracker.state(), HealthState::Unhealthy);

        assert_eq!(tracker.record(true, t0), None);
        assert_eq!(tracker.record(false, t0), None);
        assert_eq!(tracker.record(true, t0), None);
        assert_eq!(tracker.record(true, t0), Some(HealthState::Healthy));
    }

    struct ToggleCheck {
        healthy: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthChecker for ToggleCheck {
        async fn check(&self) -> Result<(), HealthCheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(HealthCheckError::Connect("refused".to_string()))
            }
        }

        fn describe(&self) -> String {
            "toggle".to_string()
        }
    }

    fn spec() -> HealthSpec {
        HealthSpec::new(HealthProbe::Command {
            argv: vec!["true".to_string()],
        })
        .with_interval(Duration::from_secs(1))
        .with_timeout(Duration::from_millis(200))
        .with_start_period(Duration::from_secs(2))
        .with_retries(2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_flips_after_start_period_and_retries() {
        let check = Arc::new(ToggleCheck {
            healthy: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        });
        let monitor = HealthMonitor::new("db", check.clone(), &spec());
        let scope = CancellationToken::new();

        monitor.start(&scope);
        assert!(monitor.is_running());

        // probes at t=0 and t=1 fall in the start period
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(monitor.state(), HealthState::Unknown);

        // t=2 and t=3 count
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.state(), HealthState::Healthy);

        check.healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.state(), HealthState::Healthy);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.state(), HealthState::Unhealthy);

        monitor.stop();
        assert_eq!(monitor.state(), HealthState::Unknown);
        let calls = check.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(check.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_with_scope() {
        let check = Arc::new(ToggleCheck {
            healthy: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        });
        let monitor = HealthMonitor::new("db", check.clone(), &spec());
        let scope = CancellationToken::new();
        monitor.start(&scope);

        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!monitor.is_running());
    }
}
