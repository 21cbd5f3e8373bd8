//! End-to-end scenarios against the public `AgentRuntime` facade: a fully
//! wired orchestrator running under a mock LLM and mock tool transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use care_orchestrator_runtime::llm::MockLlmClient;
use care_orchestrator_runtime::registry::CategoryRule;
use care_orchestrator_runtime::transport::MockToolTransport;
use care_orchestrator_runtime::types::{AgentStatus, Query, SessionId, ToolCategory, ToolDescriptor};
use care_orchestrator_runtime::{AgentRuntime, RuntimeConfig};

fn tool_descriptors() -> HashMap<String, ToolDescriptor> {
    let mut m = HashMap::new();
    m.insert(
        "literature-search".to_string(),
        ToolDescriptor {
            name: "literature-search".into(),
            category: ToolCategory::Search,
            input_schema: serde_json::json!({}),
            output_data_key: "articles".into(),
        },
    );
    m.insert(
        "clinical-trials".to_string(),
        ToolDescriptor {
            name: "clinical-trials".into(),
            category: ToolCategory::Clinical,
            input_schema: serde_json::json!({}),
            output_data_key: "trials".into(),
        },
    );
    m.insert(
        "drug-information".to_string(),
        ToolDescriptor {
            name: "drug-information".into(),
            category: ToolCategory::Pharmaceutical,
            input_schema: serde_json::json!({}),
            output_data_key: "results".into(),
        },
    );
    m
}

fn category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule { prefix: "literature".into(), category: ToolCategory::Search },
        CategoryRule { prefix: "clinical-trials".into(), category: ToolCategory::Clinical },
        CategoryRule { prefix: "drug".into(), category: ToolCategory::Pharmaceutical },
    ]
}

fn fixtures() -> HashMap<String, serde_json::Value> {
    let mut m = HashMap::new();
    m.insert(
        "literature-search".to_string(),
        serde_json::json!({
            "articles": [{
                "title": "SGLT2 inhibitors and cardiovascular outcomes",
                "doi": "10.1000/demo.001",
                "year": 2023,
                "abstract": "A pooled analysis across outcome trials."
            }]
        }),
    );
    m.insert(
        "drug-information".to_string(),
        serde_json::json!({
            "results": [{
                "title": "Empagliflozin prescribing information",
                "url_primary": "https://example.org/drugs/empagliflozin",
                "summary": "Dosing and contraindications."
            }]
        }),
    );
    m
}

fn make_runtime(llm_replies: Vec<String>) -> AgentRuntime {
    let llm = Arc::new(MockLlmClient::new(llm_replies));
    let transport = Arc::new(MockToolTransport::new(fixtures()));
    AgentRuntime::with_transport(
        RuntimeConfig::default(),
        tool_descriptors(),
        category_rules(),
        Some(llm),
        Some(transport),
    )
}

#[tokio::test]
async fn pure_literature_query_yields_citations_and_disclaimer() {
    let runtime = make_runtime(vec![
        "medical_literature_search".to_string(),
        "Tool: literature-search\nArgs: {\"query\": \"sglt2 cardiovascular outcomes\"}".to_string(),
        "Answer: SGLT2 inhibitors reduce heart failure hospitalization across the cited trials.".to_string(),
    ]);

    let query = Query::new("What does recent literature say about SGLT2 inhibitors and heart failure?", SessionId::new("s1"));
    let response = runtime.handle_query(query).await;

    assert!(response.is_well_formed());
    assert_eq!(response.agents_consulted, vec!["medical_literature_search".to_string()]);
    assert!(!response.citations.is_empty());
    assert!(!response.disclaimers.is_empty());
}

#[tokio::test]
async fn drug_focused_query_consults_medical_literature_search_agent() {
    // `drug-information` is only on `medical_literature_search`'s allow-list
    // (`clinical_research` covers literature/trials/NER, not pharmaceutical
    // lookups), so that's the agent this query should route to.
    let runtime = make_runtime(vec![
        "medical_literature_search".to_string(),
        "Tool: drug-information\nArgs: {\"drug\": \"empagliflozin\"}".to_string(),
        "Answer: Empagliflozin carries standard dosing and renal-function-based contraindications.".to_string(),
    ]);

    let query = Query::new("What are the contraindications for empagliflozin?", SessionId::new("s2"));
    let response = runtime.handle_query(query).await;

    assert!(response.is_well_formed());
    assert_eq!(response.agents_consulted, vec!["medical_literature_search".to_string()]);
    assert!(response.citations.iter().any(|c| c.title.contains("Empagliflozin")));
}

#[tokio::test]
async fn emergency_query_short_circuits_quickly_with_no_agents() {
    let runtime = make_runtime(vec![]);
    let started = Instant::now();

    let query = Query::new(
        "Patient is having crushing chest pain radiating to the left arm, what should I do right now?",
        SessionId::new("s3"),
    );
    let response = runtime.handle_query(query).await;

    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(response.agents_consulted.is_empty());
    assert!(response.tools_invoked.is_empty());
    assert!(!response.disclaimers.is_empty());
    assert_eq!(runtime.metrics().emergency_detections, 1);
}

#[tokio::test]
async fn all_agents_failing_still_yields_a_disclaimed_generic_response() {
    // The LLM never answers (replies are exhausted immediately), so every
    // selected agent's loop fails internally and falls back to an error
    // result — synthesis must still produce a well-formed response.
    let runtime = make_runtime(vec!["medical_literature_search".to_string()]);

    let query = Query::new("What does recent literature say about SGLT2 inhibitors?", SessionId::new("s4"));
    let response = runtime.handle_query(query).await;

    assert!(response.is_well_formed());
    assert!(!response.disclaimers.is_empty());
    assert!(response
        .provenance
        .per_agent_status
        .values()
        .all(|status| !matches!(status, AgentStatus::Ok)));
}

#[tokio::test]
async fn phi_bearing_query_is_rejected_without_consulting_any_agent() {
    let runtime = make_runtime(vec![]);

    let query = Query::new(
        "Follow up for John Doe, SSN 123-45-6789, regarding hypertension medication adjustments",
        SessionId::new("s5"),
    );
    let response = runtime.handle_query(query).await;

    assert!(response.agents_consulted.is_empty());
    assert!(response.tools_invoked.is_empty());
    assert!(response.formatted_summary.contains("protected health information"));
    assert_eq!(runtime.metrics().agent_invocations, 0);
}
