use crate::cancel::CancellationToken;
use crate::invocation::FuzzerInvocation;
use serde::Serialize;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not compose PATH for the fuzzer: {0}")]
    SearchPath(#[from] std::env::JoinPathsError),

    #[error("Error waiting for fuzzer process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to kill fuzzer process: {0}")]
    Kill(#[source] std::io::Error),

    /// The engine ran and terminated unsuccessfully.
    #[error("afl-fuzz {description}")]
    Exited {
        code: Option<i32>,
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchOutcome {
    /// The engine exited with status 0 on its own.
    Completed,
    /// The operator cancelled the node; the engine was stopped.
    Cancelled,
}

/// Runs a fuzzer invocation to completion.
pub trait Launcher {
    fn launch(
        &mut self,
        invocation: &FuzzerInvocation,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, LaunchError>;
}

/// Launches afl-fuzz as a child process sharing the terminal.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    shutdown_grace: Duration,
    poll_interval: Duration,
}

impl ProcessLauncher {
    pub fn new(shutdown_grace: Duration) -> Self {
        Self {
            shutdown_grace,
            poll_interval: Duration::from_millis(50),
        }
    }

    fn build_command(&self, invocation: &FuzzerInvocation) -> Result<Command, LaunchError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(&invocation.env);
        cmd.env("PATH", invocation.search_path(std::env::var_os("PATH"))?);
        Ok(cmd)
    }

    /// Waits for the child, stopping it once cancellation outlives the grace period.
    fn wait_with_cancel(
        &self,
        mut child: Child,
        cancel: &CancellationToken,
    ) -> Result<(ExitStatus, bool), LaunchError> {
        let mut cancelled_at: Option<Instant> = None;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok((status, cancelled_at.is_some())),
                Ok(None) => {
                    if cancelled_at.is_none() && cancel.is_cancelled() {
                        tracing::info!(
                            grace = ?self.shutdown_grace,
                            "cancellation requested, waiting for afl-fuzz to shut down"
                        );
                        request_shutdown(&child);
                        cancelled_at = Some(Instant::now());
                    }
                    if let Some(at) = cancelled_at {
                        if at.elapsed() >= self.shutdown_grace {
                            tracing::warn!("afl-fuzz did not exit in time, killing it");
                            child.kill().map_err(LaunchError::Kill)?;
                            let status = child.wait().map_err(LaunchError::Wait)?;
                            return Ok((status, true));
                        }
                    }
                    std::thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(LaunchError::Wait(e)),
            }
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(
        &mut self,
        invocation: &FuzzerInvocation,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, LaunchError> {
        if cancel.is_cancelled() {
            tracing::info!("cancelled before launch, not starting afl-fuzz");
            return Ok(LaunchOutcome::Cancelled);
        }

        let mut cmd = self.build_command(invocation)?;
        tracing::info!(command = %invocation.command_line(), "launching fuzzer");

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        tracing::debug!(pid = child.id(), "fuzzer started");

        let (status, cancelled) = self.wait_with_cancel(child, cancel)?;
        if cancelled {
            tracing::info!(%status, "fuzzer stopped after cancellation");
            return Ok(LaunchOutcome::Cancelled);
        }
        if status.success() {
            return Ok(LaunchOutcome::Completed);
        }
        Err(LaunchError::Exited {
            code: status.code(),
            description: describe_status(&status),
        })
    }
}

/// Asks the engine to stop so it can flush its state. The terminal's SIGINT
/// only reaches it when the whole process group was interrupted.
#[cfg(unix)]
fn request_shutdown(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "could not signal afl-fuzz");
    }
}

#[cfg(not(unix))]
fn request_shutdown(_child: &Child) {}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "exited abnormally".to_string()
}
