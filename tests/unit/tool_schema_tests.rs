//! Unit tests for the browser tool table and result formatting.
//!
//! The tool set has two shapes: the base build ships `browser_read` and
//! `browser_execute`; the `extension-tools` feature adds
//! `browser_screenshot` and `browser_tabs`. Both shapes are covered here —
//! the feature-gated assertions compile in whichever build is under test.

use serde_json::{json, Value};

use acp_proxy::mcp::tools::{self, BROWSER_EXECUTE, BROWSER_READ};
use acp_proxy::server::frames::{BrowserToolResult, Viewport};

fn names(tools: &[Value]) -> Vec<&str> {
    tools
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .collect()
}

/// The base tools are always advertised.
#[test]
fn base_tools_are_advertised() {
    let tools = tools::tool_list();
    let names = names(&tools);

    assert!(names.contains(&BROWSER_READ));
    assert!(names.contains(&BROWSER_EXECUTE));
}

/// The extension tools appear exactly when the feature is on.
#[test]
fn extension_tools_follow_the_feature_flag() {
    let tools = tools::tool_list();
    let names = names(&tools);

    #[cfg(feature = "extension-tools")]
    {
        assert_eq!(tools.len(), 4);
        assert!(names.contains(&tools::BROWSER_SCREENSHOT));
        assert!(names.contains(&tools::BROWSER_TABS));
    }
    #[cfg(not(feature = "extension-tools"))]
    {
        assert_eq!(tools.len(), 2);
        assert!(!names.contains(&tools::BROWSER_SCREENSHOT));
        assert!(!names.contains(&tools::BROWSER_TABS));
    }
}

/// `browser_execute` requires a `script` string.
#[test]
fn execute_schema_requires_script() {
    let tools = tools::tool_list();
    let execute = tools
        .iter()
        .find(|t| t["name"] == BROWSER_EXECUTE)
        .expect("browser_execute must be declared");

    assert_eq!(execute["inputSchema"]["properties"]["script"]["type"], "string");
    assert_eq!(execute["inputSchema"]["required"][0], "script");
}

/// `is_known_tool` tracks the advertised table.
#[test]
fn known_tool_tracks_the_table() {
    assert!(tools::is_known_tool(BROWSER_READ));
    assert!(!tools::is_known_tool("browser_teleport"));
    #[cfg(not(feature = "extension-tools"))]
    assert!(!tools::is_known_tool(tools::BROWSER_SCREENSHOT));
}

// ── Result formatting ─────────────────────────────────────────────────────────

/// `browser_read` renders a Markdown page summary in one text block.
#[test]
fn read_result_renders_markdown_summary() {
    let result = BrowserToolResult {
        action: Some("read".into()),
        url: Some("https://a.test/page".into()),
        title: Some("Example".into()),
        viewport: Some(Viewport {
            width: 1280,
            height: 720,
        }),
        selection: Some("highlighted".into()),
        dom: Some("## Heading\n\nBody text".into()),
        ..Default::default()
    };

    let formatted = tools::format_result(tools::BROWSER_READ, &result);
    let text = formatted["content"][0]["text"].as_str().unwrap();

    assert!(text.contains("https://a.test/page"));
    assert!(text.contains("# Example"));
    assert!(text.contains("1280×720"));
    assert!(text.contains("highlighted"));
    assert!(text.contains("Body text"));
    assert!(formatted.get("isError").is_none());
}

/// `browser_execute` JSON-encodes the returned value.
#[test]
fn execute_result_is_json_encoded() {
    let result = BrowserToolResult {
        action: Some("execute".into()),
        result: Some(json!({"sum": 4})),
        ..Default::default()
    };

    let formatted = tools::format_result(BROWSER_EXECUTE, &result);
    let text = formatted["content"][0]["text"].as_str().unwrap();

    assert!(text.contains('4'), "encoded value must include the number");
    assert!(formatted.get("isError").is_none());
}

/// A UI-reported script error becomes `isError: true`.
#[test]
fn script_error_becomes_is_error() {
    let result = BrowserToolResult {
        action: Some("execute".into()),
        error: Some("ReferenceError: nope".into()),
        ..Default::default()
    };

    let formatted = tools::format_result(BROWSER_EXECUTE, &result);
    assert_eq!(formatted["isError"], true);
    assert!(formatted["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("ReferenceError"));
}

/// Screenshot results pair the summary text with a PNG image block.
#[test]
fn screenshot_result_carries_image_block() {
    let result = BrowserToolResult {
        action: Some("screenshot".into()),
        url: Some("https://a.test/".into()),
        screenshot: Some("aGVsbG8=".into()),
        ..Default::default()
    };

    let formatted = tools::format_result(tools::BROWSER_SCREENSHOT, &result);
    assert_eq!(formatted["content"][0]["type"], "text");
    assert_eq!(formatted["content"][1]["type"], "image");
    assert_eq!(formatted["content"][1]["mimeType"], "image/png");
    assert_eq!(formatted["content"][1]["data"], "aGVsbG8=");
}

/// Tool errors are results, not JSON-RPC errors.
#[test]
fn error_result_shape() {
    let formatted = tools::error_result("Browser tool call timed out");
    assert_eq!(formatted["isError"], true);
    assert_eq!(
        formatted["content"][0]["text"],
        "Browser tool call timed out"
    );
}
