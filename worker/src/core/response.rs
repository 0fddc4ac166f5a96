//! Decoding of agent-runtime responses into structured messages.
//!
//! The runtime may answer with plain JSON, an event stream of `data: {json}`
//! lines, or an opaque nested mapping. Text is recovered by a depth-first
//! search over a prioritized set of field names; the fallback that
//! concatenates all descendant values is load-bearing for response shapes we
//! have not seen yet, so it stays explicit and tested.

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};

/// Field names checked in order when digging text out of a mapping.
const TEXT_KEYS: [&str; 6] = ["delta", "text", "content", "message", "result", "output"];

/// Recover the human-readable text from an arbitrarily shaped JSON value.
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(extract_text).collect(),
        Value::Object(map) => {
            for key in TEXT_KEYS {
                if let Some(inner) = map.get(key) {
                    return extract_text(inner);
                }
            }
            // Unknown shape: concatenate every descendant value.
            map.values().map(extract_text).collect()
        }
        other => other.to_string(),
    }
}

/// Decode a raw response body into text.
///
/// Tries the whole body as JSON first, then falls back to line-wise parsing
/// of `data: {json}` event fragments, keeping unparseable lines verbatim.
pub fn decode_response(raw: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        let extracted = extract_text(&value);
        if !extracted.trim().is_empty() {
            return extracted.trim().to_string();
        }
    }

    let mut parts = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let payload = line.strip_prefix("data: ").unwrap_or(line);
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => parts.push(extract_text(&value)),
            Err(_) => parts.push(payload.to_string()),
        }
    }
    parts.concat().trim().to_string()
}

/// One structured message from the agent: either a tool call or completion.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    ToolCall {
        tool: String,
        args: Map<String, Value>,
    },
    Final {
        summary: String,
    },
}

/// Locate and parse the first `{...}` block in the agent's response text.
///
/// The agent must respond with exactly one JSON object; we are forgiving
/// about surrounding prose.
pub fn extract_first_json_object(text: &str) -> Result<Map<String, Value>> {
    let t = text.trim();
    if t.is_empty() {
        return Err(anyhow!("empty agent response"));
    }
    let start = t.find('{');
    let end = t.rfind('}');
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => return Err(anyhow!("agent response did not contain a JSON object")),
    };
    let candidate = &t[start..=end];
    let value: Value = serde_json::from_str(candidate).with_context(|| {
        let sample: String = candidate.chars().take(500).collect();
        format!("parse agent JSON (sample: {sample})")
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("agent JSON must be an object")),
    }
}

/// Classify the agent's response text as a tool call or a final message.
pub fn parse_agent_message(text: &str) -> Result<AgentMessage> {
    let obj = extract_first_json_object(text)?;
    match obj.get("type").and_then(Value::as_str) {
        Some("final") => {
            let summary = obj
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(AgentMessage::Final { summary })
        }
        Some("tool_call") => {
            let tool = obj
                .get("tool")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("tool_call missing string 'tool'"))?
                .to_string();
            let args = match obj.get("args") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(_) => return Err(anyhow!("tool_call 'args' must be an object")),
            };
            Ok(AgentMessage::ToolCall { tool, args })
        }
        other => Err(anyhow!("unrecognized agent message type: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_priority_keys_in_order() {
        // `delta` wins even when later keys are present.
        let v = json!({"delta": "a", "text": "b", "content": "c"});
        assert_eq!(extract_text(&v), "a");
        let v = json!({"output": {"message": {"content": [{"text": "hi"}]}}});
        assert_eq!(extract_text(&v), "hi");
    }

    #[test]
    fn unknown_shapes_concatenate_descendants() {
        let v = json!({"alpha": "foo", "beta": ["bar", {"gamma": "baz"}]});
        let out = extract_text(&v);
        assert!(out.contains("foo") && out.contains("bar") && out.contains("baz"));
    }

    #[test]
    fn decodes_sse_data_lines() {
        let raw = "data: {\"delta\":\"hel\"}\n\ndata: {\"delta\":\"lo\"}\n";
        assert_eq!(decode_response(raw), "hello");
    }

    #[test]
    fn decodes_plain_json_body() {
        let raw = r#"{"result": {"text": "done"}}"#;
        assert_eq!(decode_response(raw), "done");
    }

    #[test]
    fn keeps_unparseable_stream_lines_verbatim() {
        let raw = "not json at all";
        assert_eq!(decode_response(raw), "not json at all");
    }

    #[test]
    fn parses_tool_call_with_surrounding_prose() {
        let text = "Sure, here you go: {\"type\":\"tool_call\",\"tool\":\"read_file\",\"args\":{\"path\":\"a.ts\"}} done";
        let msg = parse_agent_message(text).expect("parse");
        match msg {
            AgentMessage::ToolCall { tool, args } => {
                assert_eq!(tool, "read_file");
                assert_eq!(args.get("path"), Some(&json!("a.ts")));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_final_message() {
        let msg = parse_agent_message(r#"{"type":"final","summary":"all set"}"#).expect("parse");
        assert_eq!(
            msg,
            AgentMessage::Final {
                summary: "all set".to_string()
            }
        );
    }

    #[test]
    fn missing_json_object_is_an_error() {
        assert!(parse_agent_message("no braces here").is_err());
        assert!(parse_agent_message("").is_err());
        assert!(parse_agent_message("[1,2,3]").is_err());
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(parse_agent_message(r#"{"type":"plan"}"#).is_err());
    }
}
