//! Shared helpers: an in-process scripted agent over duplex pipes, and
//! session scaffolding.
//!
//! The fake agent owns the far end of the proxy's stdio streams: tests
//! read the JSON-RPC messages the proxy writes and script the replies,
//! which exercises the real codec, pending-call map, and inbound dispatch
//! without spawning a process.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf};
use tokio::sync::mpsc;

use acp_proxy::acp::client::{AgentClient, AgentHandler, AgentLifecycle};
use acp_proxy::server::frames::ServerFrame;
use acp_proxy::session::SessionCtx;

/// Generous bound for every await in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One UI session without a socket: the frame queue ends in the test.
pub struct TestSession {
    pub ctx: Arc<SessionCtx>,
    pub frame_rx: mpsc::Receiver<ServerFrame>,
}

/// Build a session whose outbound frames land in `frame_rx`.
pub fn test_session() -> TestSession {
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let ctx = Arc::new(SessionCtx::new("test-session".into(), frame_tx));
    TestSession { ctx, frame_rx }
}

/// Build a session with a short permission deadline.
pub fn test_session_with_permission_timeout(timeout: Duration) -> TestSession {
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let ctx = Arc::new(
        SessionCtx::new("test-session".into(), frame_tx).with_permission_timeout(timeout),
    );
    TestSession { ctx, frame_rx }
}

/// Await the next frame with the shared timeout.
pub async fn next_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> ServerFrame {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("frame must arrive before the test timeout")
        .expect("frame queue must stay open")
}

/// The scripted agent side of a live `AgentClient`.
pub struct FakeAgent {
    /// The JSON-RPC client under test.
    pub client: AgentClient,
    /// Lifecycle events the client surfaces (exit, protocol error).
    pub lifecycle_rx: mpsc::Receiver<AgentLifecycle>,
    reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: tokio::io::WriteHalf<DuplexStream>,
}

/// Wire an `AgentClient` to an in-process fake agent.
pub fn connect_fake_agent(handler: Arc<dyn AgentHandler>) -> FakeAgent {
    // Two pipes, one direction used of each: proxy stdin → agent,
    // agent stdout → proxy.
    let (proxy_stdin, agent_stdin) = tokio::io::duplex(64 * 1024);
    let (agent_stdout, proxy_stdout) = tokio::io::duplex(64 * 1024);

    let (agent_read, _unused_w) = tokio::io::split(agent_stdin);
    let (_unused_r, agent_write) = tokio::io::split(agent_stdout);

    let (lifecycle_tx, lifecycle_rx) = mpsc::channel(4);
    let client = AgentClient::start(proxy_stdout, proxy_stdin, handler, lifecycle_tx);

    FakeAgent {
        client,
        lifecycle_rx,
        reader: BufReader::new(agent_read).lines(),
        writer: agent_write,
    }
}

impl FakeAgent {
    /// Receive the next message the proxy wrote to the agent's stdin.
    pub async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(TEST_TIMEOUT, self.reader.next_line())
            .await
            .expect("agent must receive a line before the test timeout")
            .expect("agent stdin must stay open")
            .expect("proxy closed the stream before the expected message");
        serde_json::from_str(&line).expect("proxy must write valid JSON lines")
    }

    /// Emit one message on the agent's stdout.
    pub async fn send(&mut self, value: &Value) {
        let mut bytes = serde_json::to_vec(value).expect("test value must serialize");
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .await
            .expect("agent stdout must stay open");
    }

    /// Emit a raw line (for protocol-error scenarios).
    pub async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("agent stdout must stay open");
        self.writer
            .write_all(b"\n")
            .await
            .expect("agent stdout must stay open");
    }

    /// Close the agent's stdout, simulating process exit.
    pub async fn close_stdout(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
