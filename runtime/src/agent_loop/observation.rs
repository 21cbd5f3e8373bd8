//! Composes the observation string fed back into the trace after a tool
//! call (§4.5 step e): count plus top-K records, metadata only, abstracts
//! truncated, whole observation capped in bytes to protect the LLM's
//! context window.

use serde_json::Value;

pub fn summarize_records(records: &[Value], top_k: usize, snippet_chars: usize, byte_cap: usize) -> String {
    if records.is_empty() {
        return "0 results.".to_string();
    }

    let mut out = format!("{} result(s) found. Top {}:\n", records.len(), top_k.min(records.len()));
    for record in records.iter().take(top_k) {
        out.push_str("- ");
        out.push_str(&describe_record(record, snippet_chars));
        out.push('\n');

        if out.len() >= byte_cap {
            break;
        }
    }

    if out.len() > byte_cap {
        out.truncate(byte_cap.saturating_sub(3));
        out.push_str("...");
    }
    out
}

fn describe_record(record: &Value, snippet_chars: usize) -> String {
    let title = record.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
    let year = record.get("year").and_then(|v| v.as_u64());
    let mut line = match year {
        Some(y) => format!("{title} ({y})"),
        None => title.to_string(),
    };

    if let Some(abstract_text) = record
        .get("abstract")
        .or_else(|| record.get("summary"))
        .and_then(|v| v.as_str())
    {
        let truncated: String = abstract_text.chars().take(snippet_chars).collect();
        line.push_str(" — ");
        line.push_str(&truncated);
        if abstract_text.chars().count() > snippet_chars {
            line.push_str("...");
        }
    }
    line
}
