//! Process control port - spawn, signal, and observe child processes.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::domain::errors::ProcessError;

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Human-readable description (`exit status: 1`, `signal: 9`, ...)
    pub detail: String,
}

impl ProcessExit {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            detail: format!("exit status: {code}"),
        }
    }

    pub fn unknown() -> Self {
        Self {
            code: None,
            detail: "exit status unknown".to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Signals a running process. Both calls are fire-and-forget; completion is
/// observed through [`SpawnedProcess::exit`].
pub trait ProcessControl: Send + Sync {
    /// Request graceful termination (SIGTERM on unix).
    fn terminate(&self) -> Result<(), ProcessError>;

    /// Force termination.
    fn kill(&self) -> Result<(), ProcessError>;
}

/// A freshly spawned process and the channels that observe it.
pub struct SpawnedProcess {
    pub pid: u32,
    /// Interleaved stdout/stderr chunks; closes when both streams reach EOF
    pub output: mpsc::Receiver<Vec<u8>>,
    /// Resolves once the process has exited
    pub exit: oneshot::Receiver<ProcessExit>,
    pub control: Arc<dyn ProcessControl>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Starts processes. Substituted by a fake in tests.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `argv[0]` with the remaining arguments, capturing its output.
    async fn spawn(&self, argv: &[String]) -> Result<SpawnedProcess, ProcessError>;
}
