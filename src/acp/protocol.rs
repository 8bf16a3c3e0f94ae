//! ACP wire types.
//!
//! The dynamic unions of the protocol (`ContentBlock`, `SessionUpdate`,
//! permission options and outcomes, stop reasons) are modelled as tagged
//! enums wrapped in an untagged known/unknown pair: a variant the proxy does
//! not recognise deserialises into the `Unknown` arm carrying the raw value
//! and is re-emitted verbatim, so newer agents keep working through older
//! proxies.
//!
//! The agent→UI `session/update` hot path does not round-trip through these
//! types; updates are forwarded as opaque [`serde_json::Value`]s. The typed
//! enums exist for the places the proxy must peek (model bookkeeping,
//! prompt validation) and for tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ACP protocol version requested during `initialize`.
pub const PROTOCOL_VERSION: u16 = 1;

// ── Content blocks ────────────────────────────────────────────────────────────

/// One block of prompt or message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    /// A block with a recognised `type` tag.
    Known(KnownContentBlock),
    /// Any other block, preserved byte-for-byte.
    Unknown(Value),
}

/// The content block variants the proxy understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownContentBlock {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// An inline image.
    Image {
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Base64-encoded image bytes.
        #[serde(rename = "base64Data")]
        base64_data: String,
    },
    /// A reference to a resource by URI.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ContentBlock {
    /// Construct a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Known(KnownContentBlock::Text { text: text.into() })
    }

    /// Construct an image block.
    #[must_use]
    pub fn image(mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Self::Known(KnownContentBlock::Image {
            mime_type: mime_type.into(),
            base64_data: base64_data.into(),
        })
    }
}

// ── Session updates ───────────────────────────────────────────────────────────

/// One `session/update` notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionUpdate {
    /// An update with a recognised `sessionUpdate` tag.
    Known(KnownSessionUpdate),
    /// Any other update, preserved byte-for-byte.
    Unknown(Value),
}

/// The `sessionUpdate` variants the proxy understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum KnownSessionUpdate {
    /// A chunk of the agent's reply.
    AgentMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// A chunk of the agent's reasoning.
    AgentThoughtChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// A replayed chunk of the user's prompt.
    UserMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// A tool call was declared.
    ToolCall {
        /// Agent-minted tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Human-readable title.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Tool kind hint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        /// Initial lifecycle status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolCallStatus>,
        /// Raw tool input.
        #[serde(
            rename = "rawInput",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        raw_input: Option<Value>,
    },
    /// A tool call changed state.
    ToolCallUpdate {
        /// Agent-minted tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// New lifecycle status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolCallStatus>,
        /// Merged content blocks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        /// Raw tool input.
        #[serde(
            rename = "rawInput",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        raw_input: Option<Value>,
        /// Raw tool output.
        #[serde(
            rename = "rawOutput",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        raw_output: Option<Value>,
    },
    /// The agent published a plan.
    Plan {
        /// Plan entries, forwarded opaquely.
        entries: Value,
    },
    /// The agent switched models mid-session.
    CurrentModelUpdate {
        /// The now-current model id.
        #[serde(rename = "modelId")]
        model_id: String,
    },
}

/// Tool call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Declared but not started.
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the client.
    Canceled,
    /// Any future state.
    #[serde(other)]
    Unknown,
}

// ── Permissions ───────────────────────────────────────────────────────────────

/// One option offered by a `session/requestPermission` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionOption {
    /// Agent-minted option id, echoed back in the outcome.
    #[serde(rename = "optionId")]
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Affordance hint for the UI.
    pub kind: PermissionOptionKind,
}

/// Option kinds recognised for UI affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this call only.
    AllowOnce,
    /// Allow this and future matching calls.
    AllowAlways,
    /// Reject this call only.
    RejectOnce,
    /// Reject this and future matching calls.
    RejectAlways,
    /// Any future kind.
    #[serde(other)]
    Unknown,
}

/// The user's decision on a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    /// The request was cancelled (user dismissal, timeout, or session close).
    Cancelled,
    /// The user picked one of the offered options.
    Selected {
        /// The chosen option id.
        #[serde(rename = "optionId")]
        option_id: String,
    },
}

// ── Prompt results ────────────────────────────────────────────────────────────

/// Why a prompt turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The agent finished its turn.
    EndTurn,
    /// Token budget exhausted.
    MaxTokens,
    /// Turn-request budget exhausted.
    MaxTurnRequests,
    /// The agent refused to continue.
    Refusal,
    /// The turn was cancelled via `session/cancel`.
    Cancelled,
    /// Any future reason.
    #[serde(other)]
    Unknown,
}

/// Result payload of `session/prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    /// Why the turn ended.
    #[serde(rename = "stopReason")]
    pub stop_reason: StopReason,
}

// ── Initialize / session handshake ────────────────────────────────────────────

/// Prompt content kinds the agent accepts, from `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCapabilities {
    /// Image blocks accepted.
    pub image: bool,
    /// Audio blocks accepted.
    pub audio: bool,
    /// Embedded-context resource blocks accepted.
    #[serde(rename = "embeddedContext")]
    pub embedded_context: bool,
}

/// Agent self-description from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent name.
    pub name: String,
    /// Agent version, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Capabilities section of the `initialize` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentCapabilities {
    /// Prompt content kinds the agent accepts.
    #[serde(rename = "promptCapabilities", default)]
    pub prompt_capabilities: PromptCapabilities,
}

/// Result of ACP `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResponse {
    /// Highest protocol version the agent speaks.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u16,
    /// Agent capability set.
    #[serde(rename = "agentCapabilities", default)]
    pub agent_capabilities: AgentCapabilities,
    /// Agent self-description.
    #[serde(rename = "agentInfo", default)]
    pub agent_info: Option<AgentInfo>,
}

/// One selectable model, as shown to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    #[serde(alias = "modelId")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Model selection state carried in the `session/new` result.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionModelState {
    /// Models the agent can switch between.
    #[serde(rename = "availableModels", default)]
    pub available_models: Vec<ModelInfo>,
    /// The currently selected model id.
    #[serde(rename = "currentModelId")]
    pub current_model_id: String,
}

/// Result of ACP `session/new`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSessionResponse {
    /// Agent-minted session id.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Model selection state, absent when the agent lacks model switching.
    #[serde(default)]
    pub models: Option<SessionModelState>,
}
