//! Default tool descriptors, category rules, and mock fixtures. Stands in
//! for a real deployment's tool-server manifest so the CLI runs standalone
//! against either real subprocesses or, under `--mock`, canned data.

use std::collections::HashMap;

use care_orchestrator_runtime::types::{ToolCategory, ToolDescriptor};
use care_orchestrator_runtime::registry::CategoryRule;

pub fn default_tool_descriptors() -> HashMap<String, ToolDescriptor> {
    let mut m = HashMap::new();
    m.insert(
        "literature-search".to_string(),
        ToolDescriptor {
            name: "literature-search".into(),
            category: ToolCategory::Search,
            input_schema: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            output_data_key: "articles".into(),
        },
    );
    m.insert(
        "clinical-trials".to_string(),
        ToolDescriptor {
            name: "clinical-trials".into(),
            category: ToolCategory::Clinical,
            input_schema: serde_json::json!({"type": "object", "properties": {"condition": {"type": "string"}}}),
            output_data_key: "trials".into(),
        },
    );
    m.insert(
        "drug-information".to_string(),
        ToolDescriptor {
            name: "drug-information".into(),
            category: ToolCategory::Pharmaceutical,
            input_schema: serde_json::json!({"type": "object", "properties": {"drug": {"type": "string"}}}),
            output_data_key: "results".into(),
        },
    );
    m.insert(
        "ner-analyze".to_string(),
        ToolDescriptor {
            name: "ner-analyze".into(),
            category: ToolCategory::Ner,
            input_schema: serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            output_data_key: "entities".into(),
        },
    );
    m
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule { prefix: "literature".into(), category: ToolCategory::Search },
        CategoryRule { prefix: "clinical-trials".into(), category: ToolCategory::Clinical },
        CategoryRule { prefix: "drug".into(), category: ToolCategory::Pharmaceutical },
        CategoryRule { prefix: "ner".into(), category: ToolCategory::Ner },
    ]
}

/// Canned `tools/call` replies keyed by tool name, used by `MockToolTransport`.
pub fn mock_tool_fixtures() -> HashMap<String, serde_json::Value> {
    let mut m = HashMap::new();
    m.insert(
        "literature-search".to_string(),
        serde_json::json!({
            "articles": [
                {
                    "title": "SGLT2 inhibitors and cardiovascular outcomes: a meta-analysis",
                    "doi": "10.1000/demo.2023.001",
                    "year": 2023,
                    "journal": "Journal of Demo Cardiology",
                    "abstract": "A pooled analysis of cardiovascular outcome trials for SGLT2 inhibitors."
                }
            ]
        }),
    );
    m.insert(
        "clinical-trials".to_string(),
        serde_json::json!({
            "trials": [
                {
                    "title": "Phase III trial of SGLT2 inhibitor in heart failure",
                    "pmid": "9999999",
                    "year": 2022,
                    "summary": "Randomized controlled trial evaluating hospitalization rates."
                }
            ]
        }),
    );
    m.insert(
        "drug-information".to_string(),
        serde_json::json!({
            "results": [
                {
                    "title": "Empagliflozin prescribing information",
                    "url_primary": "https://example.org/drugs/empagliflozin",
                    "summary": "Dosing, contraindications, and interaction profile."
                }
            ]
        }),
    );
    m.insert(
        "ner-analyze".to_string(),
        serde_json::json!({ "entities": [] }),
    );
    m
}
