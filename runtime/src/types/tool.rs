//! Tool-facing data model (§3: ToolDescriptor, ToolInvocation, ToolResponseEnvelope, Connection)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::SessionId;

/// The domain category a tool belongs to. Drives pool affinity (C1) and
/// agent allow-lists (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Pharmaceutical,
    Clinical,
    Ner,
    General,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolCategory::Search => "search",
            ToolCategory::Pharmaceutical => "pharmaceutical",
            ToolCategory::Clinical => "clinical",
            ToolCategory::Ner => "ner",
            ToolCategory::General => "general",
        };
        write!(f, "{s}")
    }
}

/// Static description of a tool exposed by a tool server, as enumerated by
/// the registry (C2) from `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub category: ToolCategory,
    pub input_schema: serde_json::Value,
    /// Names the JSON field inside the tool's response envelope that
    /// carries the payload records (e.g. `articles`, `results`).
    pub output_data_key: String,
}

/// Arguments for a tool call. An ordered map so that `canonical()` — used to
/// build the cache key — is deterministic regardless of call-site insertion
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolArguments(pub BTreeMap<String, serde_json::Value>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// A stable, order-independent string form used as cache-key input.
    pub fn canonical(&self) -> String {
        // BTreeMap iteration is already key-ordered, and serde_json encodes
        // maps in iteration order, so this is deterministic independent of
        // insertion order.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// A request to call one tool, scoped to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: ToolArguments,
    pub session_id: SessionId,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: ToolArguments, session_id: SessionId) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            session_id,
        }
    }

    /// `cache_key = hash(tool_name, canonical(arguments), session_id)` (§3).
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.tool_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.arguments.canonical().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.session_id.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// The uniform wrapper every tool server emits: `{ content: [{ type: "text",
/// text: JSON_STRING }] }`. The inner `JSON_STRING` must be decoded and the
/// `output_data_key` extracted to obtain records (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponseEnvelope {
    pub content: Vec<EnvelopeContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

impl ToolResponseEnvelope {
    pub fn wrapping(payload: &serde_json::Value) -> Self {
        Self {
            content: vec![EnvelopeContentBlock {
                block_type: "text".into(),
                text: payload.to_string(),
            }],
        }
    }

    /// Decode `content[0].text` as JSON and return `parsed[output_data_key]`
    /// as a list of records. Never raises — parsing failures (and a missing
    /// or non-list key) yield an empty record list (§3 invariant, §4.2).
    pub fn parse_records(&self, output_data_key: &str) -> Vec<serde_json::Value> {
        let Some(first) = self.content.first() else {
            tracing::warn!("tool response envelope had no content blocks");
            return Vec::new();
        };

        match serde_json::from_str::<serde_json::Value>(&first.text) {
            Ok(parsed) => match parsed.get(output_data_key) {
                Some(serde_json::Value::Array(items)) => items.clone(),
                Some(_) => {
                    tracing::warn!(output_data_key, "envelope data key was not a list");
                    Vec::new()
                }
                None => {
                    tracing::warn!(output_data_key, "envelope missing data key");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse tool envelope inner JSON");
                Vec::new()
            }
        }
    }
}

/// Lifecycle of a pooled subprocess connection (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Spawned,
    Initialized,
    Idle,
    InUse,
    Drained,
    Terminated,
    Unhealthy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_is_insertion_order_independent() {
        let a = ToolArguments::new()
            .insert("b", serde_json::json!(2))
            .insert("a", serde_json::json!(1));
        let b = ToolArguments::new()
            .insert("a", serde_json::json!(1))
            .insert("b", serde_json::json!(2));
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn cache_key_is_deterministic_and_session_scoped() {
        let args = ToolArguments::new().insert("q", serde_json::json!("sglt2"));
        let inv1 = ToolInvocation::new("literature-search", args.clone(), SessionId::new("s1"));
        let inv2 = ToolInvocation::new("literature-search", args.clone(), SessionId::new("s1"));
        let inv3 = ToolInvocation::new("literature-search", args, SessionId::new("s2"));

        assert_eq!(inv1.cache_key(), inv2.cache_key());
        assert_ne!(inv1.cache_key(), inv3.cache_key());
    }

    #[test]
    fn envelope_roundtrip_parses_records() {
        let payload = serde_json::json!({ "articles": [{"title": "a"}, {"title": "b"}] });
        let envelope = ToolResponseEnvelope::wrapping(&payload);
        let records = envelope.parse_records("articles");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn envelope_roundtrip_is_idempotent_for_same_key() {
        let payload = serde_json::json!({ "results": [{"id": 1}] });
        let envelope = ToolResponseEnvelope::wrapping(&payload);
        let r1 = envelope.parse_records("results");
        let r2 = envelope.parse_records("results");
        assert_eq!(r1, r2);
    }

    #[test]
    fn malformed_inner_json_yields_empty_records_not_a_panic() {
        let envelope = ToolResponseEnvelope {
            content: vec![EnvelopeContentBlock {
                block_type: "text".into(),
                text: "not json at all {".into(),
            }],
        };
        assert!(envelope.parse_records("articles").is_empty());
    }

    #[test]
    fn missing_data_key_yields_empty_records() {
        let payload = serde_json::json!({ "other_field": [1, 2, 3] });
        let envelope = ToolResponseEnvelope::wrapping(&payload);
        assert!(envelope.parse_records("articles").is_empty());
    }

    #[test]
    fn non_list_data_key_yields_empty_records() {
        let payload = serde_json::json!({ "articles": "not a list" });
        let envelope = ToolResponseEnvelope::wrapping(&payload);
        assert!(envelope.parse_records("articles").is_empty());
    }
}
