//! Agent Client Protocol (ACP) process supervision and stdio transport.
//!
//! Each UI session owns at most one running agent. [`AgentLink`] bundles the
//! spawned process, the JSON-RPC client over its stdio, and the exit
//! monitor; dropping or closing the link tears all three down.
//!
//! # Submodules
//!
//! - [`codec`]: NDJSON framing with a 1 MiB per-line limit.
//! - [`protocol`]: ACP wire types with raw-preserving unknown variants.
//! - [`spawner`]: process spawning, stderr draining, termination.
//! - [`client`]: JSON-RPC client with pending-call map and inbound dispatch.

pub mod client;
pub mod codec;
pub mod protocol;
pub mod spawner;

use std::path::Path;
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;

pub use client::{AgentClient, AgentHandler, AgentLifecycle};

/// A running agent: process + JSON-RPC connection + exit monitor.
pub struct AgentLink {
    /// JSON-RPC handle for calls and notifications.
    pub client: AgentClient,
    pid: Option<u32>,
    monitor: JoinHandle<Child>,
    stderr_task: JoinHandle<()>,
}

impl AgentLink {
    /// Spawn the agent in `cwd` and wire up the stdio connection.
    ///
    /// Lifecycle events (unsolicited exit, framing errors) arrive on
    /// `lifecycle_tx` exactly once per failure; the owning session treats
    /// the first event as terminal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Acp`] when the process cannot be spawned.
    pub fn spawn(
        cmd: &str,
        args: &[String],
        cwd: &Path,
        handler: Arc<dyn AgentHandler>,
        lifecycle_tx: mpsc::Sender<AgentLifecycle>,
    ) -> Result<Self> {
        let spawned = spawner::spawn_agent(cmd, args, cwd)?;
        let pid = spawned.child.id();
        let client = AgentClient::start(
            spawned.stdout,
            spawned.stdin,
            handler,
            lifecycle_tx.clone(),
        );
        let monitor = spawner::monitor_exit(spawned.child, lifecycle_tx);

        Ok(Self {
            client,
            pid,
            monitor,
            stderr_task: spawned.stderr_task,
        })
    }

    /// Tear the agent down: reject outstanding calls, close stdin, and kill
    /// the process (SIGTERM, then SIGKILL after a grace period).
    pub async fn close(self) {
        self.client.close().await;
        spawner::terminate(self.pid, self.monitor).await;
        self.stderr_task.abort();
    }
}
