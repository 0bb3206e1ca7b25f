//! Process introspection port - per-process and host resource readings.

use crate::domain::errors::ProbeError;
use crate::domain::models::{HostStats, ResourceSample};

/// Reads the OS process table.
///
/// Implementations are synchronous and may be slow; callers run them off the
/// async executor. Every failure is recoverable.
pub trait ProcessProbe: Send + Sync {
    /// Refresh the cached process table before a batch of reads.
    fn refresh(&self);

    /// CPU and memory of a single process (children not included).
    fn process_usage(&self, pid: u32) -> Result<ResourceSample, ProbeError>;

    /// Direct children of `pid`.
    fn child_pids(&self, pid: u32) -> Vec<u32>;

    /// Host-wide CPU and memory.
    fn host_stats(&self) -> Result<HostStats, ProbeError>;
}
