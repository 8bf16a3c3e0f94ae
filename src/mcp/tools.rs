//! Browser tool declarations and result formatting.
//!
//! The base build exposes `browser_read` and `browser_execute`; the
//! `extension-tools` feature adds `browser_screenshot` and `browser_tabs`
//! for the extension variant of the UI. The proxy never runs a script
//! itself — `browser_execute` is documented as running under
//! `new Function(script)()` in the page's main world, where the page CSP
//! applies; the proxy only ferries the script and the result.

use serde_json::{json, Value};

use crate::server::frames::BrowserToolResult;

/// `browser_read` tool name.
pub const BROWSER_READ: &str = "browser_read";

/// `browser_execute` tool name.
pub const BROWSER_EXECUTE: &str = "browser_execute";

/// `browser_screenshot` tool name (extension build).
pub const BROWSER_SCREENSHOT: &str = "browser_screenshot";

/// `browser_tabs` tool name (extension build).
pub const BROWSER_TABS: &str = "browser_tabs";

/// Is `name` one of the tools this build advertises?
#[must_use]
pub fn is_known_tool(name: &str) -> bool {
    tool_list()
        .iter()
        .any(|tool| tool.get("name").and_then(Value::as_str) == Some(name))
}

/// The advertised tool table for `tools/list`.
#[must_use]
pub fn tool_list() -> Vec<Value> {
    #[cfg_attr(not(feature = "extension-tools"), allow(unused_mut))]
    let mut tools = vec![
        json!({
            "name": BROWSER_READ,
            "description": "Read the current page in the connected browser: URL, title, \
                            viewport, selection, and a simplified DOM rendered as Markdown.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }),
        json!({
            "name": BROWSER_EXECUTE,
            "description": "Execute a JavaScript snippet in the current page's main world \
                            via new Function(script)(); the page CSP applies. Returns the \
                            script's return value JSON-encoded.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "script": { "type": "string" }
                },
                "required": ["script"],
                "additionalProperties": false
            }
        }),
    ];

    #[cfg(feature = "extension-tools")]
    {
        tools.push(json!({
            "name": BROWSER_SCREENSHOT,
            "description": "Capture a screenshot of the visible tab as a PNG image.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }));
        tools.push(json!({
            "name": BROWSER_TABS,
            "description": "List the browser's open tabs with their URLs and titles.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }
        }));
    }

    tools
}

/// Format a successful tool round-trip into MCP `tools/call` content.
#[must_use]
pub fn format_result(tool: &str, result: &BrowserToolResult) -> Value {
    if let Some(error) = &result.error {
        return error_result(error);
    }

    match tool {
        BROWSER_READ => text_result(&render_page_summary(result), false),
        BROWSER_EXECUTE => {
            let value = result.result.clone().unwrap_or(Value::Null);
            let rendered =
                serde_json::to_string(&value).unwrap_or_else(|_| "null".to_owned());
            text_result(&rendered, false)
        }
        BROWSER_SCREENSHOT => {
            let mut content = vec![json!({
                "type": "text",
                "text": render_page_summary(result),
            })];
            if let Some(data) = &result.screenshot {
                content.push(json!({
                    "type": "image",
                    "data": data,
                    "mimeType": "image/png",
                }));
            }
            json!({ "content": content })
        }
        BROWSER_TABS => {
            let tabs = result.tabs.clone().unwrap_or_else(|| json!([]));
            let rendered =
                serde_json::to_string_pretty(&tabs).unwrap_or_else(|_| "[]".to_owned());
            text_result(&rendered, false)
        }
        other => error_result(&format!("Unknown tool: {other}")),
    }
}

/// Build a failed tool result (`isError: true`, message in a text block).
///
/// Tool failures are tool-call *results*, never JSON-RPC errors, so the
/// agent can reason about them.
#[must_use]
pub fn error_result(message: &str) -> Value {
    text_result(message, true)
}

fn text_result(text: &str, is_error: bool) -> Value {
    let mut value = json!({
        "content": [{ "type": "text", "text": text }],
    });
    if is_error {
        value["isError"] = Value::Bool(true);
    }
    value
}

/// Render the page summary for `browser_read` (and the caption of a
/// screenshot) as Markdown.
fn render_page_summary(result: &BrowserToolResult) -> String {
    let mut out = String::new();

    if let Some(title) = &result.title {
        out.push_str(&format!("# {title}\n\n"));
    }
    if let Some(url) = &result.url {
        out.push_str(&format!("**URL:** {url}\n"));
    }
    if let Some(viewport) = &result.viewport {
        out.push_str(&format!(
            "**Viewport:** {}×{}\n",
            viewport.width, viewport.height
        ));
    }
    if let Some(selection) = result.selection.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("\n## Selection\n\n> {selection}\n"));
    }
    if let Some(dom) = &result.dom {
        out.push_str(&format!("\n## Page content\n\n{dom}\n"));
    }

    if out.is_empty() {
        out.push_str("(empty page)");
    }
    out
}
