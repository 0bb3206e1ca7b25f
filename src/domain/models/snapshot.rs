use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{HealthState, ServiceStatus};

/// CPU and memory usage of a process tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// CPU usage summed across the process and its children (may exceed 100)
    pub cpu_percent: f64,
    /// Resident memory in MB summed across the process and its children
    pub memory_mb: f64,
}

impl ResourceSample {
    pub fn is_zero(&self) -> bool {
        self.cpu_percent == 0.0 && self.memory_mb == 0.0
    }
}

impl std::ops::AddAssign for ResourceSample {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu_percent += rhs.cpu_percent;
        self.memory_mb += rhs.memory_mb;
    }
}

/// Host-wide CPU and memory usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub memory_percent: f64,
}

/// Point-in-time copy of one service's state.
///
/// Never shares storage with the live instance; every query builds new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub description: String,
    pub status: ServiceStatus,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub health: HealthState,
    pub depends_on: Vec<String>,
    pub error: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl ServiceSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }

    /// Time since the process started, if it is running.
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.started_at.map(|t| Utc::now().signed_duration_since(t))
    }
}
