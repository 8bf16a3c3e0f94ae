//! Agent process spawning and termination.
//!
//! Spawns the configured agent command with piped stdio and
//! `kill_on_drop(true)` so the process never outlives the proxy. The agent's
//! stderr is drained into the proxy log; it is never forwarded to the UI.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::acp::client::AgentLifecycle;
use crate::{AppError, Result};

/// Grace period between SIGTERM and SIGKILL when closing the agent.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// A freshly spawned agent process with captured stdio.
#[derive(Debug)]
pub struct SpawnedAgent {
    /// Child handle. `kill_on_drop` is set.
    pub child: Child,
    /// Agent stdin, for the JSON-RPC writer.
    pub stdin: ChildStdin,
    /// Agent stdout, for the JSON-RPC reader.
    pub stdout: ChildStdout,
    /// Drains stderr into the log; detached on drop.
    pub stderr_task: JoinHandle<()>,
}

/// Spawn the agent subprocess in `cwd` with piped stdio.
///
/// # Errors
///
/// Returns [`AppError::Acp`] when the OS spawn fails or a stdio pipe cannot
/// be captured.
pub fn spawn_agent(cmd: &str, args: &[String], cwd: &Path) -> Result<SpawnedAgent> {
    let mut child = Command::new(cmd)
        .args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::Acp(format!("failed to spawn agent '{cmd}': {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Acp("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Acp("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Acp("failed to capture agent stderr".into()))?;

    // Stderr lines go to the proxy log only.
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "agent_stderr", "{line}");
        }
    });

    info!(cmd, cwd = %cwd.display(), "agent process spawned");

    Ok(SpawnedAgent {
        child,
        stdin,
        stdout,
        stderr_task,
    })
}

/// Terminate the agent: SIGTERM, then SIGKILL after [`KILL_GRACE`].
///
/// The child itself is owned by the exit monitor ([`monitor_exit`]); this
/// signals by pid and awaits the monitor for reaping. On non-Unix platforms
/// (no SIGTERM) the monitor is aborted, which drops the child and lets
/// `kill_on_drop` reclaim it.
pub async fn terminate(pid: Option<u32>, monitor: JoinHandle<Child>) {
    #[cfg(unix)]
    {
        if let Some(raw) = pid {
            #[allow(clippy::cast_possible_wrap)]
            let pid = nix::unistd::Pid::from_raw(raw as i32);
            if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                debug!(%err, "SIGTERM failed; process likely already gone");
            }
            match tokio::time::timeout(KILL_GRACE, monitor).await {
                Ok(Ok(_child)) => {
                    info!("agent exited after SIGTERM");
                }
                Ok(Err(err)) => {
                    warn!(%err, "exit monitor failed while terminating agent");
                }
                Err(_elapsed) => {
                    warn!("agent ignored SIGTERM; sending SIGKILL");
                    if let Err(err) =
                        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL)
                    {
                        debug!(%err, "SIGKILL failed; process likely already gone");
                    }
                }
            }
            return;
        }
    }

    let _ = pid;
    // No pid (already reaped) or non-Unix: drop the child via the monitor.
    monitor.abort();
    let _ = monitor.await;
}

/// Watch for unsolicited agent exit.
///
/// Sends [`AgentLifecycle::Exited`] through `lifecycle_tx` when the child
/// terminates on its own. The send fails silently when the owning session is
/// already tearing the agent down.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    lifecycle_tx: mpsc::Sender<AgentLifecycle>,
) -> JoinHandle<Child> {
    tokio::spawn(async move {
        let reason = match child.wait().await {
            Ok(status) => status.code().map_or_else(
                || "agent terminated by signal".to_owned(),
                |code| format!("agent exited with code {code}"),
            ),
            Err(err) => format!("wait error: {err}"),
        };
        if lifecycle_tx
            .send(AgentLifecycle::Exited { reason })
            .await
            .is_err()
        {
            debug!("exit monitor: receiver closed before exit could be delivered");
        }
        child
    })
}
