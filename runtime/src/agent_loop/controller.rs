//! Agent Iteration Controller (C5): a ReAct-style loop that calls tools
//! with caching, bounded iterations, and structured parsing, producing a
//! synthesized answer — never a raw source list (§4.5).

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::audit::{AuditTrail, EventKind, Outcome};
use crate::cache::ResponseCache;
use crate::llm::{CompletionRequest, LlmClient};
use crate::registry::ToolRegistry;
use crate::transport::ToolTransport;
use crate::types::{
    AgentAction, AgentResult, AgentStep, AgentTask, Citation, CitationKind, RuntimeError,
    ToolArguments, ToolInvocation,
};

use super::journal::{AgentStepEvent, BufferedJournal};
use super::observation::summarize_records;
use super::step_parser::parse_step;

#[derive(Debug, Clone)]
pub struct IterationConfig {
    pub top_k: usize,
    pub snippet_chars: usize,
    pub observation_byte_cap: usize,
    pub per_tool_timeout: Duration,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            snippet_chars: 280,
            observation_byte_cap: 4096,
            per_tool_timeout: Duration::from_secs(30),
        }
    }
}

pub struct AgentLoop<'a> {
    llm: &'a dyn LlmClient,
    registry: &'a ToolRegistry,
    cache: &'a ResponseCache,
    transport: &'a dyn ToolTransport,
    audit: &'a AuditTrail,
    config: IterationConfig,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        registry: &'a ToolRegistry,
        cache: &'a ResponseCache,
        transport: &'a dyn ToolTransport,
        audit: &'a AuditTrail,
        config: IterationConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            cache,
            transport,
            audit,
            config,
        }
    }

    pub async fn run(
        &self,
        task: &AgentTask,
        system_prompt: &str,
        journal: &BufferedJournal,
    ) -> Result<AgentResult, RuntimeError> {
        let mut trace: Vec<AgentStep> = Vec::new();
        let mut collected_records: Vec<Value> = Vec::new();
        let mut tools_invoked: Vec<String> = Vec::new();
        let mut iteration: u32 = 0;

        while iteration < task.max_iterations {
            journal.push(AgentStepEvent::IterationStarted { index: iteration });

            let prompt = render_prompt(system_prompt, task, &trace);
            let reply = self
                .llm
                .complete(CompletionRequest::new(prompt).with_stop(vec!["\n\n".into()]), self.config.per_tool_timeout)
                .await?;

            let step_result = parse_step(&reply);
            let (action, observation) = match step_result {
                Err(reason) => {
                    journal.push(AgentStepEvent::ParseFailure { reason: reason.clone() });
                    let action = AgentAction::Answer { text: String::new() };
                    trace.push(AgentStep {
                        iteration_index: iteration,
                        thought: reply.clone(),
                        action,
                        observation: Some(format!("error: could not parse step ({reason})")),
                    });
                    iteration += 1;
                    continue;
                }
                Ok(AgentAction::Answer { text }) => {
                    journal.push(AgentStepEvent::AnswerProduced);
                    return Ok(AgentResult::ok(&task.agent_name, text)
                        .with_citations(dedup_citations(extract_citations(&collected_records)))
                        .with_tools_invoked(tools_invoked));
                }
                Ok(call @ AgentAction::CallTool { .. }) => {
                    let AgentAction::CallTool { name, args } = &call else { unreachable!() };

                    if !task.allowed_tools.is_empty() && !task.allowed_tools.iter().any(|t| t == name) {
                        journal.push(AgentStepEvent::ToolRejected { tool: name.clone() });
                        (call, format!("Tool '{name}' is not permitted for this agent."))
                    } else {
                        tools_invoked.push(name.clone());
                        journal.push(AgentStepEvent::ToolDispatched { tool: name.clone() });
                        let records = self.dispatch_tool(task, name, args).await;
                        let obs = summarize_records(
                            &records,
                            self.config.top_k,
                            self.config.snippet_chars,
                            self.config.observation_byte_cap,
                        );
                        collected_records.extend(records);
                        (call, obs)
                    }
                }
            };

            journal.push(AgentStepEvent::ObservationCollected { byte_len: observation.len() });
            trace.push(AgentStep {
                iteration_index: iteration,
                thought: reply,
                action,
                observation: Some(observation),
            });
            iteration += 1;
        }

        journal.push(AgentStepEvent::IterationsExhausted);
        Ok(self.synthesize_on_exhaustion(task, &collected_records, tools_invoked))
    }

    async fn dispatch_tool(&self, task: &AgentTask, tool_name: &str, args: &Value) -> Vec<Value> {
        let category = self.registry.categorize(tool_name);
        let output_key = self
            .registry
            .descriptor(tool_name)
            .map(|d| d.output_data_key.clone())
            .unwrap_or_else(|_| "results".to_string());

        let tool_args = value_to_tool_arguments(args);
        let invocation = ToolInvocation::new(tool_name, tool_args, task.query.session_id.clone());
        let cache_key = invocation.cache_key();

        if let Some(cached) = self.cache.get(&task.query.session_id, &cache_key).await {
            self.audit.record_cache_hit();
            return extract_records(&cached, &output_key);
        }

        let started = std::time::Instant::now();
        match self
            .transport
            .call_tool(category, tool_name, args.clone(), self.config.per_tool_timeout)
            .await
        {
            Ok(envelope) => {
                self.audit.emit(
                    &task.query.session_id,
                    "agent_loop",
                    EventKind::ToolCall,
                    Outcome::Ok,
                    Some(started.elapsed().as_millis() as u64),
                    serde_json::json!({"tool": tool_name}),
                );
                let records = envelope.parse_records(&output_key);
                if let Ok(serialized) = serde_json::to_value(&envelope) {
                    self.cache.put(&task.query.session_id, cache_key, serialized).await;
                }
                records
            }
            Err(e) => {
                self.audit.emit(
                    &task.query.session_id,
                    "agent_loop",
                    EventKind::ToolCall,
                    Outcome::Error,
                    Some(started.elapsed().as_millis() as u64),
                    serde_json::json!({"tool": tool_name, "error": e.to_string()}),
                );
                tracing::warn!(tool = tool_name, error = %e, "tool call failed inside agent loop");
                Vec::new()
            }
        }
    }

    /// Never return a raw source list: synthesize a short narrative plus
    /// deduplicated citations from whatever was collected (§4.5 step 3).
    fn synthesize_on_exhaustion(&self, task: &AgentTask, records: &[Value], tools_invoked: Vec<String>) -> AgentResult {
        let citations = dedup_citations(extract_citations(records));

        let summary = if citations.is_empty() {
            format!(
                "{} reached its iteration limit without a conclusive answer and found no usable sources for \"{}\".",
                task.agent_name, truncate(&task.query.text, 120)
            )
        } else {
            format!(
                "{} reviewed {} source(s) related to \"{}\" but exhausted its iteration budget before concluding; see citations below.",
                task.agent_name,
                citations.len(),
                truncate(&task.query.text, 120)
            )
        };

        AgentResult::ok(&task.agent_name, summary)
            .with_citations(citations)
            .with_tools_invoked(tools_invoked)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn value_to_tool_arguments(args: &Value) -> ToolArguments {
    let mut out = ToolArguments::new();
    if let Some(map) = args.as_object() {
        for (k, v) in map {
            out = out.insert(k.clone(), v.clone());
        }
    }
    out
}

fn extract_records(cached_envelope: &Value, output_key: &str) -> Vec<Value> {
    let Ok(envelope) = serde_json::from_value::<crate::types::ToolResponseEnvelope>(cached_envelope.clone()) else {
        return Vec::new();
    };
    envelope.parse_records(output_key)
}

fn extract_citations(records: &[Value]) -> Vec<Citation> {
    records.iter().filter_map(record_to_citation).collect()
}

fn record_to_citation(record: &Value) -> Option<Citation> {
    let title = record.get("title").and_then(|v| v.as_str())?.to_string();
    let doi = record.get("doi").and_then(|v| v.as_str()).map(str::to_string);
    let pmid = record.get("pmid").and_then(|v| v.as_str()).map(str::to_string);
    let url_primary = record
        .get("url")
        .or_else(|| record.get("url_primary"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let url_fallback = record.get("url_fallback").and_then(|v| v.as_str()).map(str::to_string);
    let year = record.get("year").and_then(|v| v.as_u64()).map(|y| y as u32);
    let journal = record.get("journal").and_then(|v| v.as_str()).map(str::to_string);
    let snippet = record
        .get("abstract")
        .or_else(|| record.get("summary"))
        .and_then(|v| v.as_str())
        .map(|s| truncate(s, 280));

    let kind = match record.get("kind").and_then(|v| v.as_str()) {
        Some("trial") => CitationKind::Trial,
        Some("drug") => CitationKind::Drug,
        Some("guideline") => CitationKind::Guideline,
        _ => CitationKind::Article,
    };

    let primary_id = doi.clone().or_else(|| pmid.clone()).unwrap_or_else(|| title.clone());

    Some(Citation {
        kind,
        primary_id,
        title,
        year,
        journal,
        url_primary,
        url_fallback,
        snippet,
        doi,
        pmid,
    })
}

/// Deduplicate by §3 precedence (DOI > PMID > URL > title+year), merging
/// the most specific non-empty value per field when duplicates differ.
/// Idempotent: applying it twice yields the same list (§8).
pub fn dedup_citations(citations: Vec<Citation>) -> Vec<Citation> {
    let mut merged: HashMap<String, Citation> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for citation in citations {
        let key = citation.dedup_key();
        match merged.get_mut(&key) {
            Some(existing) => merge_into(existing, citation),
            None => {
                order.push(key.clone());
                merged.insert(key, citation);
            }
        }
    }

    order.into_iter().filter_map(|k| merged.remove(&k)).collect()
}

fn merge_into(existing: &mut Citation, incoming: Citation) {
    if existing.year.is_none() {
        existing.year = incoming.year;
    }
    if existing.journal.is_none() {
        existing.journal = incoming.journal;
    }
    if existing.url_primary.is_empty() {
        existing.url_primary = incoming.url_primary;
    }
    if existing.url_fallback.is_none() {
        existing.url_fallback = incoming.url_fallback;
    }
    if existing.snippet.is_none() {
        existing.snippet = incoming.snippet;
    }
    if existing.doi.is_none() {
        existing.doi = incoming.doi;
    }
    if existing.pmid.is_none() {
        existing.pmid = incoming.pmid;
    }
}

fn render_prompt(system_prompt: &str, task: &AgentTask, trace: &[AgentStep]) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt);
    prompt.push_str("\n\nQuery: ");
    prompt.push_str(&task.query.text);
    prompt.push_str("\nContext: ");
    prompt.push_str(&task.context);
    prompt.push_str("\nAllowed tools: ");
    prompt.push_str(&task.allowed_tools.join(", "));
    prompt.push('\n');

    for step in trace {
        prompt.push_str(&format!("\nThought {}: {}\n", step.iteration_index, step.thought));
        if let Some(obs) = &step.observation {
            prompt.push_str(&format!("Observation: {obs}\n"));
        }
    }
    prompt.push_str("\nRespond with either `Tool: <name>` followed by `Args: <json>`, or `Answer: <text>`.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::llm::MockLlmClient;
    use crate::registry::{CategoryRule, ToolRegistry};
    use crate::types::{Query, SessionId, ToolCategory, ToolDescriptor, ToolResponseEnvelope, TransportError};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn audit() -> AuditTrail {
        AuditTrail::new(Arc::new(InMemoryAuditSink::default()))
    }

    struct EchoingTransport;

    #[async_trait]
    impl ToolTransport for EchoingTransport {
        async fn call_tool(
            &self,
            _category: ToolCategory,
            _tool_name: &str,
            _arguments: Value,
            _call_timeout: Duration,
        ) -> Result<ToolResponseEnvelope, TransportError> {
            let payload = serde_json::json!({
                "articles": [
                    {"title": "SGLT2 inhibitors in HFpEF", "year": 2023, "doi": "10.1/abc", "journal": "NEJM"}
                ]
            });
            Ok(ToolResponseEnvelope::wrapping(&payload))
        }
    }

    fn registry() -> ToolRegistry {
        let mut descriptors = HashMap::new();
        descriptors.insert(
            "literature-search".to_string(),
            ToolDescriptor {
                name: "literature-search".into(),
                category: ToolCategory::Search,
                input_schema: serde_json::json!({}),
                output_data_key: "articles".into(),
            },
        );
        ToolRegistry::new(
            Arc::new(EchoingTransport),
            descriptors,
            vec![CategoryRule {
                prefix: "literature".into(),
                category: ToolCategory::Search,
            }],
            Duration::from_secs(1),
        )
    }

    fn task() -> AgentTask {
        let query = Query::new("SGLT2 inhibitors in HFpEF", SessionId::new("s1"));
        AgentTask::new("medical_literature_search", query, "no PHI present")
            .with_allowed_tools(vec!["literature-search".into()])
    }

    #[tokio::test]
    async fn answer_after_one_tool_call_yields_citations() {
        let llm = MockLlmClient::new(vec![
            "Tool: literature-search\nArgs: {\"query\": \"sglt2 hfpef\"}".to_string(),
            "Answer: SGLT2 inhibitors reduce hospitalization risk in HFpEF patients.".to_string(),
        ]);
        let cache = ResponseCache::new(256);
        let registry = registry();
        let transport = EchoingTransport;
        let audit = audit();
        let agent_loop = AgentLoop::new(&llm, &registry, &cache, &transport, &audit, IterationConfig::default());
        let journal = BufferedJournal::default();

        let result = agent_loop.run(&task(), "You are a literature search agent.", &journal).await.unwrap();
        assert!(!result.formatted_summary.is_empty());
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.tools_invoked, vec!["literature-search".to_string()]);
    }

    #[tokio::test]
    async fn disallowed_tool_is_rejected_and_loop_continues() {
        let llm = MockLlmClient::new(vec![
            "Tool: drug-information\nArgs: {}".to_string(),
            "Answer: no drug-specific findings.".to_string(),
        ]);
        let cache = ResponseCache::new(256);
        let registry = registry();
        let transport = EchoingTransport;
        let audit = audit();
        let agent_loop = AgentLoop::new(&llm, &registry, &cache, &transport, &audit, IterationConfig::default());
        let journal = BufferedJournal::default();

        let result = agent_loop.run(&task(), "prompt", &journal).await.unwrap();
        assert!(result.tools_invoked.is_empty());
        assert!(!result.formatted_summary.is_empty());
    }

    #[tokio::test]
    async fn iteration_exhaustion_synthesizes_never_raw_list() {
        let replies: Vec<String> = (0..8)
            .map(|_| "Tool: literature-search\nArgs: {}".to_string())
            .collect();
        let llm = MockLlmClient::new(replies);
        let cache = ResponseCache::new(256);
        let registry = registry();
        let transport = EchoingTransport;
        let audit = audit();
        let agent_loop = AgentLoop::new(&llm, &registry, &cache, &transport, &audit, IterationConfig::default());
        let journal = BufferedJournal::default();

        let result = agent_loop.run(&task().with_max_iterations(8), "prompt", &journal).await.unwrap();
        assert!(!result.formatted_summary.is_empty());
        assert!(!result.formatted_summary.contains('{'));
        assert_eq!(result.citations.len(), 1);
    }

    #[tokio::test]
    async fn unparseable_step_is_recorded_and_loop_continues() {
        let llm = MockLlmClient::new(vec![
            "I am pondering deeply.".to_string(),
            "Answer: concluded after a parse hiccup.".to_string(),
        ]);
        let cache = ResponseCache::new(256);
        let registry = registry();
        let transport = EchoingTransport;
        let audit = audit();
        let agent_loop = AgentLoop::new(&llm, &registry, &cache, &transport, &audit, IterationConfig::default());
        let journal = BufferedJournal::default();

        let result = agent_loop.run(&task(), "prompt", &journal).await.unwrap();
        assert_eq!(result.formatted_summary, "concluded after a parse hiccup.");
    }

    #[test]
    fn dedup_citations_is_idempotent() {
        let citations = vec![
            Citation {
                kind: CitationKind::Article,
                primary_id: "10.1/abc".into(),
                title: "A".into(),
                year: Some(2020),
                journal: None,
                url_primary: String::new(),
                url_fallback: None,
                snippet: None,
                doi: Some("10.1/abc".into()),
                pmid: None,
            },
            Citation {
                kind: CitationKind::Article,
                primary_id: "10.1/abc".into(),
                title: "A".into(),
                year: None,
                journal: Some("NEJM".into()),
                url_primary: String::new(),
                url_fallback: None,
                snippet: None,
                doi: Some("10.1/abc".into()),
                pmid: None,
            },
        ];
        let once = dedup_citations(citations.clone());
        let twice = dedup_citations(once.clone());
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].journal.as_deref(), Some("NEJM"));
        assert_eq!(once.len(), twice.len());
    }
}
