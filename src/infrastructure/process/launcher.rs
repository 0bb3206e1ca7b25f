//! [`ProcessLauncher`] backed by `tokio::process`.
//!
//! On unix each service runs in its own process group so termination reaches
//! the whole tree a command spawns (`go run`, `npm run`, shell wrappers).

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::domain::errors::ProcessError;
use crate::domain::ports::{ProcessControl, ProcessExit, ProcessLauncher, SpawnedProcess};

const READ_CHUNK: usize = 8 * 1024;
const OUTPUT_QUEUE: usize = 256;

/// Spawns services as direct child processes with captured output.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessLauncher {
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every service from `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn spawn(&self, argv: &[String]) -> Result<SpawnedProcess, ProcessError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::Spawn {
                program: String::new(),
                reason: "empty command".to_string(),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            program: program.clone(),
            reason: "process exited before its id could be read".to_string(),
        })?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, output_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, output_tx));
        }

        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Some(()) = kill_rx.recv() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => exit_from_status(status),
                Err(e) => ProcessExit {
                    code: None,
                    detail: format!("wait failed: {e}"),
                },
            };
            trace!(pid, exit = %exit, "child reaped");
            let _ = exit_tx.send(exit);
        });

        debug!(pid, program = %program, "spawned process");

        Ok(SpawnedProcess {
            pid,
            output: output_rx,
            exit: exit_rx,
            control: Arc::new(ChildControl { pid, kill_tx }),
        })
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn exit_from_status(status: ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
        detail: status.to_string(),
    }
}

struct ChildControl {
    pid: u32,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ProcessControl for ChildControl {
    #[cfg(unix)]
    fn terminate(&self) -> Result<(), ProcessError> {
        signal_group(self.pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> Result<(), ProcessError> {
        self.kill()
    }

    fn kill(&self) -> Result<(), ProcessError> {
        #[cfg(unix)]
        let signalled = signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
        #[cfg(not(unix))]
        let signalled = Err(ProcessError::Gone { pid: self.pid });

        // the reaper also kills the direct child while it is still waiting
        if self.kill_tx.send(()).is_ok() {
            Ok(())
        } else {
            signalled
        }
    }
}

/// Signal the process group led by `pid`, falling back to `pid` alone.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(_) => match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProcessError::Gone { pid }),
            Err(e) => Err(ProcessError::Signal {
                pid,
                reason: e.to_string(),
            }),
        },
    }
}
