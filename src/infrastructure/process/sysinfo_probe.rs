//! [`ProcessProbe`] backed by a shared `sysinfo::System`.
//!
//! CPU figures are deltas between consecutive refreshes, so the first reading
//! after construction is zero.

use std::sync::{Mutex, MutexGuard, PoisonError};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::domain::errors::ProbeError;
use crate::domain::models::{HostStats, ResourceSample};
use crate::domain::ports::ProcessProbe;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

impl ProcessProbe for SysinfoProbe {
    fn refresh(&self) {
        self.system().refresh_processes(ProcessesToUpdate::All, true);
    }

    fn process_usage(&self, pid: u32) -> Result<ResourceSample, ProbeError> {
        let system = self.system();
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(ProbeError::NotFound(pid))?;

        Ok(ResourceSample {
            cpu_percent: f64::from(process.cpu_usage()),
            memory_mb: to_mb(process.memory()),
        })
    }

    fn child_pids(&self, pid: u32) -> Vec<u32> {
        let parent = Pid::from_u32(pid);
        self.system()
            .processes()
            .iter()
            .filter(|(_, process)| process.parent() == Some(parent))
            .map(|(child, _)| child.as_u32())
            .collect()
    }

    fn host_stats(&self) -> Result<HostStats, ProbeError> {
        let mut system = self.system();
        system.refresh_cpu_all();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("total memory reported as zero".to_string()));
        }
        let used = system.used_memory();

        Ok(HostStats {
            cpu_percent: f64::from(system.global_cpu_usage()),
            memory_mb: to_mb(used),
            memory_percent: to_mb(used) / to_mb(total) * 100.0,
        })
    }
}
