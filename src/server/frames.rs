//! WebSocket frame vocabulary between the proxy and UI clients.
//!
//! Every frame is a JSON object `{ "type": …, "payload": … }`. Frames
//! without a payload omit the field. Inbound frames the proxy does not
//! recognise are dropped with a warning; they never tear the session down.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acp::protocol::{ModelInfo, PermissionOutcome, PromptCapabilities, StopReason};
use crate::sandbox::watcher::FsChange;
use crate::sandbox::DirEntryInfo;

/// Model selection state as shown to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    /// Models the agent can switch between.
    pub available: Vec<ModelInfo>,
    /// The currently selected model id.
    #[serde(rename = "currentId")]
    pub current_id: String,
}

/// Result of a browser tool call, as reported by the UI.
///
/// The shape varies by tool; unknown fields are preserved nowhere — the
/// proxy only reads what it formats into the MCP reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserToolResult {
    /// Which action produced this result (`read`, `execute`, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Page URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Page title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Viewport dimensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Current text selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    /// Simplified DOM / page text for `read`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom: Option<String>,
    /// Returned value for `execute`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Script error reported by the page, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 PNG for `screenshot`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Tab list for `tabs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Value>,
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

// ── UI → proxy ────────────────────────────────────────────────────────────────

/// Frames a UI client sends to the proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UiFrame {
    /// Spawn the agent and run ACP `initialize`.
    Connect,
    /// Tear the agent down but keep the socket open.
    Disconnect,
    /// Create an ACP session rooted at `cwd`.
    NewSession {
        /// Working directory; defaults to the process cwd.
        #[serde(default)]
        cwd: Option<String>,
    },
    /// Send one user turn.
    Prompt {
        /// Content blocks, forwarded verbatim to the agent.
        content: Vec<Value>,
    },
    /// Cancel the in-flight prompt.
    Cancel,
    /// Answer a pending permission request.
    PermissionResponse {
        /// Proxy-minted request id.
        #[serde(rename = "requestId")]
        request_id: String,
        /// The user's decision.
        outcome: PermissionOutcome,
    },
    /// Answer a pending browser tool call.
    BrowserToolResult {
        /// Correlation id from the matching `browser_tool_call`.
        #[serde(rename = "callId")]
        call_id: String,
        /// Tool result on success.
        #[serde(default)]
        result: Option<BrowserToolResult>,
        /// Error message on failure.
        #[serde(default)]
        error: Option<String>,
    },
    /// Switch the agent to another model.
    SetSessionModel {
        /// Target model id.
        #[serde(rename = "modelId")]
        model_id: String,
    },
    /// List a directory under the sandbox root.
    FsList {
        /// Root-relative path.
        path: String,
    },
    /// Read a file under the sandbox root.
    FsRead {
        /// Root-relative path.
        path: String,
    },
    /// Start streaming change batches for the sandbox root.
    FsWatchStart,
    /// Stop streaming change batches.
    FsWatchStop,
}

// ── Proxy → UI ────────────────────────────────────────────────────────────────

/// Frames the proxy sends to a UI client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Agent connection status changed.
    Status {
        /// Whether an agent is connected.
        connected: bool,
        /// Agent self-description, when connected.
        #[serde(rename = "agentInfo", skip_serializing_if = "Option::is_none")]
        agent_info: Option<Value>,
        /// Prompt capabilities, when connected.
        #[serde(skip_serializing_if = "Option::is_none")]
        capabilities: Option<PromptCapabilities>,
    },
    /// A verb failed; the session stays usable.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// ACP session created.
    SessionCreated {
        /// Agent-minted session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Prompt content kinds the agent accepts.
        #[serde(rename = "promptCapabilities")]
        prompt_capabilities: PromptCapabilities,
        /// Model selection state, when the agent supports switching.
        #[serde(skip_serializing_if = "Option::is_none")]
        models: Option<ModelState>,
    },
    /// One `session/update` from the agent, forwarded verbatim.
    SessionUpdate {
        /// ACP session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// The update payload, opaque to the proxy.
        update: Value,
    },
    /// The prompt turn ended.
    PromptComplete {
        /// Why the turn ended.
        #[serde(rename = "stopReason")]
        stop_reason: StopReason,
    },
    /// The agent asks the user for permission.
    PermissionRequest {
        /// Proxy-minted request id; echo it in `permission_response`.
        #[serde(rename = "requestId")]
        request_id: String,
        /// ACP session id.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Options to offer, forwarded from the agent.
        options: Value,
        /// The tool call awaiting permission, forwarded from the agent.
        #[serde(rename = "toolCall")]
        tool_call: Value,
    },
    /// The session model changed.
    ModelChanged {
        /// The now-current model id.
        #[serde(rename = "modelId")]
        model_id: String,
    },
    /// The agent wants a browser tool executed.
    BrowserToolCall {
        /// Correlation id; echo it in `browser_tool_result`.
        #[serde(rename = "callId")]
        call_id: String,
        /// Tool name and arguments.
        params: Value,
    },
    /// Directory listing result.
    FsListing {
        /// The listed path.
        path: String,
        /// Listing entries.
        items: Vec<DirEntryInfo>,
    },
    /// File read result.
    FsContent {
        /// The read path.
        path: String,
        /// Text, base64 image data, or a binary stub.
        content: String,
        /// File size on disk.
        size: u64,
        /// Whether `content` is not plain text.
        binary: bool,
        /// Whether content was cut at a cap.
        truncated: bool,
        /// MIME type for inline images.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// Coalesced filesystem change batch.
    FsChanges {
        /// Changes observed within one quiescence window.
        batch: Vec<FsChange>,
    },
}
