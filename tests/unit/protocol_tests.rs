//! Unit tests for the ACP wire types: tagged unions, unknown-variant
//! preservation, and camelCase field names.

use serde_json::json;

use acp_proxy::acp::protocol::{
    ContentBlock, KnownContentBlock, KnownSessionUpdate, PermissionOption, PermissionOptionKind,
    PermissionOutcome, PromptCapabilities, SessionUpdate, StopReason, ToolCallStatus,
};

// ── Content blocks ────────────────────────────────────────────────────────────

/// Text and image blocks parse into the known variants.
#[test]
fn known_content_blocks_parse() {
    let text: ContentBlock = serde_json::from_value(json!({"type": "text", "text": "hi"})).unwrap();
    assert!(matches!(
        text,
        ContentBlock::Known(KnownContentBlock::Text { ref text }) if text == "hi"
    ));

    let image: ContentBlock = serde_json::from_value(json!({
        "type": "image",
        "mimeType": "image/png",
        "base64Data": "aWNvbg==",
    }))
    .unwrap();
    assert!(matches!(
        image,
        ContentBlock::Known(KnownContentBlock::Image { ref mime_type, .. }) if mime_type == "image/png"
    ));
}

/// An unrecognised block round-trips byte-for-byte through `Unknown`.
#[test]
fn unknown_content_block_round_trips() {
    let raw = json!({"type": "audio", "mimeType": "audio/wav", "base64Data": "UklGRg=="});
    let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();

    assert!(matches!(block, ContentBlock::Unknown(_)));
    assert_eq!(
        serde_json::to_value(&block).unwrap(),
        raw,
        "unknown blocks must re-emit verbatim"
    );
}

/// The convenience constructors produce the wire shape.
#[test]
fn content_constructors_match_wire_shape() {
    let value = serde_json::to_value(ContentBlock::text("Hello")).unwrap();
    assert_eq!(value, json!({"type": "text", "text": "Hello"}));

    let image = serde_json::to_value(ContentBlock::image("image/png", "QUJD")).unwrap();
    assert_eq!(image["mimeType"], "image/png");
    assert_eq!(image["base64Data"], "QUJD");
}

// ── Session updates ───────────────────────────────────────────────────────────

/// The documented `sessionUpdate` tags parse into known variants.
#[test]
fn known_session_updates_parse() {
    let chunk: SessionUpdate = serde_json::from_value(json!({
        "sessionUpdate": "agent_message_chunk",
        "content": {"type": "text", "text": "Hi!"},
    }))
    .unwrap();
    assert!(matches!(
        chunk,
        SessionUpdate::Known(KnownSessionUpdate::AgentMessageChunk { .. })
    ));

    let tool_call: SessionUpdate = serde_json::from_value(json!({
        "sessionUpdate": "tool_call",
        "toolCallId": "tc-1",
        "title": "Read file",
        "status": "pending",
    }))
    .unwrap();
    match tool_call {
        SessionUpdate::Known(KnownSessionUpdate::ToolCall {
            tool_call_id,
            status,
            ..
        }) => {
            assert_eq!(tool_call_id, "tc-1");
            assert_eq!(status, Some(ToolCallStatus::Pending));
        }
        other => panic!("expected tool_call update, got: {other:?}"),
    }

    let model: SessionUpdate = serde_json::from_value(json!({
        "sessionUpdate": "current_model_update",
        "modelId": "m-2",
    }))
    .unwrap();
    assert!(matches!(
        model,
        SessionUpdate::Known(KnownSessionUpdate::CurrentModelUpdate { ref model_id }) if model_id == "m-2"
    ));
}

/// A future update tag is preserved and re-emitted verbatim.
#[test]
fn unknown_session_update_round_trips() {
    let raw = json!({"sessionUpdate": "vibe_check", "level": 11});
    let update: SessionUpdate = serde_json::from_value(raw.clone()).unwrap();

    assert!(matches!(update, SessionUpdate::Unknown(_)));
    assert_eq!(serde_json::to_value(&update).unwrap(), raw);
}

/// Tool call lifecycle states parse, with a fallback for future ones.
#[test]
fn tool_call_status_parses_with_fallback() {
    let known: ToolCallStatus = serde_json::from_value(json!("in_progress")).unwrap();
    assert_eq!(known, ToolCallStatus::InProgress);

    let future: ToolCallStatus = serde_json::from_value(json!("negotiating")).unwrap();
    assert_eq!(future, ToolCallStatus::Unknown);
}

// ── Permissions ───────────────────────────────────────────────────────────────

/// Option kinds parse, including the forward-compatible fallback.
#[test]
fn permission_option_kinds_parse() {
    let option: PermissionOption = serde_json::from_value(json!({
        "optionId": "a1",
        "name": "Allow once",
        "kind": "allow_once",
    }))
    .unwrap();
    assert_eq!(option.kind, PermissionOptionKind::AllowOnce);

    let future: PermissionOptionKind = serde_json::from_value(json!("allow_for_a_week")).unwrap();
    assert_eq!(future, PermissionOptionKind::Unknown);
}

/// Outcomes serialize to the documented tagged shapes.
#[test]
fn permission_outcomes_serialize() {
    assert_eq!(
        serde_json::to_value(PermissionOutcome::Cancelled).unwrap(),
        json!({"outcome": "cancelled"})
    );
    assert_eq!(
        serde_json::to_value(PermissionOutcome::Selected {
            option_id: "allow_once".into()
        })
        .unwrap(),
        json!({"outcome": "selected", "optionId": "allow_once"})
    );
}

// ── Stop reasons and capabilities ─────────────────────────────────────────────

/// Stop reasons parse, with a fallback for future ones.
#[test]
fn stop_reasons_parse_with_fallback() {
    let cancelled: StopReason = serde_json::from_value(json!("cancelled")).unwrap();
    assert_eq!(cancelled, StopReason::Cancelled);

    let end_turn: StopReason = serde_json::from_value(json!("end_turn")).unwrap();
    assert_eq!(end_turn, StopReason::EndTurn);

    let future: StopReason = serde_json::from_value(json!("ran_out_of_ideas")).unwrap();
    assert_eq!(future, StopReason::Unknown);
}

/// Prompt capabilities default to all-false and read camelCase names.
#[test]
fn prompt_capabilities_default_false() {
    let empty: PromptCapabilities = serde_json::from_value(json!({})).unwrap();
    assert!(!empty.image && !empty.audio && !empty.embedded_context);

    let caps: PromptCapabilities =
        serde_json::from_value(json!({"image": true, "embeddedContext": true})).unwrap();
    assert!(caps.image);
    assert!(caps.embedded_context);
    assert!(!caps.audio);
}
