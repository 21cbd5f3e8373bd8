//! Parse-tolerant extraction of a single ReAct step from an LLM reply
//! (§4.5 Parsing tolerance). Accepts prose preamble and trailing text;
//! extracts the first well-formed `Answer:` or `Tool:`/`Args:` pair.

use crate::types::AgentAction;

/// Markers the local LLM is prompted to emit. Case-insensitive, matched
/// wherever they first appear in the reply rather than requiring the
/// reply to start with them.
const ANSWER_MARKER: &str = "answer:";
const TOOL_MARKER: &str = "tool:";
const ARGS_MARKER: &str = "args:";

pub fn parse_step(reply: &str) -> Result<AgentAction, String> {
    let lower = reply.to_lowercase();

    let answer_pos = lower.find(ANSWER_MARKER);
    let tool_pos = lower.find(TOOL_MARKER);

    match (answer_pos, tool_pos) {
        (Some(a), Some(t)) if a <= t => parse_answer(reply, a),
        (Some(a), None) => parse_answer(reply, a),
        (_, Some(t)) => parse_tool(reply, &lower, t),
        (None, None) => Err("reply contained neither an Answer: nor a Tool: marker".to_string()),
    }
}

fn parse_answer(reply: &str, marker_pos: usize) -> Result<AgentAction, String> {
    let text = reply[marker_pos + ANSWER_MARKER.len()..].trim();
    if text.is_empty() {
        return Err("Answer: marker had no following text".to_string());
    }
    Ok(AgentAction::Answer { text: text.to_string() })
}

fn parse_tool(reply: &str, lower: &str, marker_pos: usize) -> Result<AgentAction, String> {
    let after_tool = &reply[marker_pos + TOOL_MARKER.len()..];
    let name_line = after_tool.lines().next().unwrap_or("").trim();
    let name = name_line.split_whitespace().next().unwrap_or("").trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
    if name.is_empty() {
        return Err("Tool: marker had no tool name".to_string());
    }

    let args_pos = lower[marker_pos..].find(ARGS_MARKER).map(|p| p + marker_pos);
    let args = match args_pos {
        Some(pos) => {
            let after_args = &reply[pos + ARGS_MARKER.len()..];
            extract_json_object(after_args).unwrap_or(serde_json::json!({}))
        }
        None => serde_json::json!({}),
    };

    Ok(AgentAction::CallTool {
        name: name.to_string(),
        args,
    })
}

/// Scan for the first balanced `{...}` substring and parse it as JSON.
/// Tolerates trailing prose after the closing brace.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}
