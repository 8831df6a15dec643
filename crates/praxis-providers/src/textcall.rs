use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use praxis_types::ToolCall;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<(?:functioncall|tool_call)>\s*|\[TOOL_CALL\]\s*").expect("valid tag pattern")
    })
}

/// Recovers tool calls embedded in plain response text. Many local models
/// emit calls as `<functioncall>{"name":"exec","arguments":{...}}` instead
/// of using the structured tool_calls field; each tag is followed by one
/// balanced JSON object which becomes a synthesized `ToolCall` with a
/// generated `textcall_<n>` id.
pub fn extract_tool_calls_from_text(content: &str) -> Vec<ToolCall> {
    let mut tool_calls = Vec::new();

    for loc in tag_pattern().find_iter(content) {
        let remaining = &content[loc.end()..];

        let Some(json_str) = extract_balanced_json(remaining) else {
            continue;
        };

        let Ok(parsed) = serde_json::from_str::<Value>(json_str) else {
            tracing::debug!(target: "praxis.providers", "failed to parse text tool call payload");
            continue;
        };
        let Some(name) = parsed.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let arguments = match parsed.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            // Some models stringify the arguments JSON.
            Some(Value::String(raw)) => match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(map) => map,
                Err(_) => {
                    let mut map = Map::new();
                    map.insert("raw".to_string(), Value::String(raw.clone()));
                    map
                }
            },
            _ => Map::new(),
        };

        tool_calls.push(ToolCall::new(
            format!("textcall_{}", tool_calls.len()),
            name,
            arguments,
        ));
    }

    tool_calls
}

/// Finds the first balanced JSON object in `s`, tracking brace depth with
/// string and escape awareness. Returns the object including its outer
/// braces, or None when no balanced object exists.
fn extract_balanced_json(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }

        if ch == b'\\' && in_string {
            escaped = true;
            continue;
        }

        if ch == b'"' {
            in_string = !in_string;
            continue;
        }

        if in_string {
            continue;
        }

        match ch {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }

    None // unbalanced braces
}
