//! Orchestrator (C7): admits a query, runs the safety gate, selects
//! agents via local-LLM classification, dispatches them under deadlines,
//! and hands results to synthesis (§4.7).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout as tokio_timeout;

use crate::agent_loop::{AgentLoop, BufferedJournal, IterationConfig};
use crate::agents::AgentRegistry;
use crate::audit::{AuditTrail, EventKind, Outcome};
use crate::cache::ResponseCache;
use crate::llm::{CompletionRequest, LlmClient};
use crate::registry::ToolRegistry;
use crate::safety::SafetyGate;
use crate::synthesis::Synthesizer;
use crate::transport::ToolTransport;
use crate::types::{AgentResult, AgentTask, Provenance, Query, Response};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub router_timeout: Duration,
    pub per_agent_default: Duration,
    pub per_agent_hard_cap: Duration,
    pub selection_fallback_agent: String,
    pub always_run: Vec<String>,
    pub allow_parallel_helpers: bool,
    pub max_selected_agents: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            router_timeout: Duration::from_secs(5),
            per_agent_default: Duration::from_secs(45),
            per_agent_hard_cap: Duration::from_secs(120),
            selection_fallback_agent: "medical_literature_search".to_string(),
            always_run: Vec::new(),
            allow_parallel_helpers: false,
            max_selected_agents: 3,
        }
    }
}

pub struct Orchestrator {
    safety: SafetyGate,
    llm: Arc<dyn LlmClient>,
    agents: AgentRegistry,
    tool_registry: Arc<ToolRegistry>,
    cache: Arc<ResponseCache>,
    transport: Arc<dyn ToolTransport>,
    synthesizer: Synthesizer,
    audit: Arc<AuditTrail>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        safety: SafetyGate,
        llm: Arc<dyn LlmClient>,
        agents: AgentRegistry,
        tool_registry: Arc<ToolRegistry>,
        cache: Arc<ResponseCache>,
        transport: Arc<dyn ToolTransport>,
        synthesizer: Synthesizer,
        audit: Arc<AuditTrail>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            safety,
            llm,
            agents,
            tool_registry,
            cache,
            transport,
            synthesizer,
            audit,
            config,
        }
    }

    pub async fn handle(&self, query: Query) -> Response {
        let started = Instant::now();

        if let Some(detected) = self.safety.detect_emergency(&query.text) {
            self.audit.emit(
                &query.session_id,
                "orchestrator",
                EventKind::Emergency,
                Outcome::Ok,
                Some(started.elapsed().as_millis() as u64),
                serde_json::json!({"category": format!("{:?}", detected.category)}),
            );
            return Response {
                formatted_summary: self.safety.emergency_response(detected),
                citations: Vec::new(),
                agents_consulted: Vec::new(),
                tools_invoked: Vec::new(),
                disclaimers: vec![self.safety.disclaimer(None, Some("immediate"), None)],
                provenance: Provenance {
                    selection_rationale: Some("emergency short-circuit".to_string()),
                    per_agent_status: Default::default(),
                },
            };
        }

        let scan = self.safety.scan(&query.text);
        if scan.phi_found {
            self.audit.emit(
                &query.session_id,
                "safety",
                EventKind::PhiDetected,
                Outcome::Ok,
                None,
                serde_json::json!({"rejected": self.safety.should_reject(&scan)}),
            );
        }
        if self.safety.should_reject(&scan) {
            self.audit.emit(
                &query.session_id,
                "orchestrator",
                EventKind::SafetyRejection,
                Outcome::Rejected,
                Some(started.elapsed().as_millis() as u64),
                serde_json::json!({"reason": "phi_detected"}),
            );
            return Response {
                formatted_summary: "This request appears to contain protected health information and cannot be processed under the current privacy policy. Please resubmit without identifying details.".to_string(),
                citations: Vec::new(),
                agents_consulted: Vec::new(),
                tools_invoked: Vec::new(),
                disclaimers: vec![self.safety.disclaimer(None, None, None)],
                provenance: Provenance {
                    selection_rationale: Some("safety rejection".to_string()),
                    per_agent_status: Default::default(),
                },
            };
        }

        let safe_query = if scan.phi_found {
            let mut q = query.clone();
            q.text = self.safety.redact(&query.text, &scan);
            q
        } else {
            query.clone()
        };

        let (selected, rationale) = self.select_agents(&safe_query).await;

        let results = self.dispatch(&safe_query, &selected).await;

        for result in &results {
            self.audit.emit(
                &safe_query.session_id,
                "orchestrator",
                EventKind::AgentResult,
                outcome_for(result),
                None,
                serde_json::json!({"agent": result.agent_name, "status": format!("{:?}", result.status)}),
            );
        }

        let response = self.synthesizer.synthesize(&results, &self.safety, Some(rationale));

        self.audit.emit(
            &safe_query.session_id,
            "orchestrator",
            EventKind::FinalResponse,
            Outcome::Ok,
            Some(started.elapsed().as_millis() as u64),
            serde_json::json!({"agents_consulted": response.agents_consulted}),
        );

        response
    }

    async fn select_agents(&self, query: &Query) -> (Vec<String>, String) {
        let descriptions = self.agents.descriptions();
        let prompt = render_selection_prompt(&query.text, &descriptions);

        let llm_selected = match tokio_timeout(
            self.config.router_timeout,
            self.llm.complete(CompletionRequest::new(prompt), self.config.router_timeout),
        )
        .await
        {
            Ok(Ok(reply)) => parse_agent_names(&reply, &self.agents),
            Ok(Err(_)) | Err(_) => Vec::new(),
        };

        let rationale = if llm_selected.is_empty() {
            format!("falling back to {}", self.config.selection_fallback_agent)
        } else {
            format!("selected via local LLM: {}", llm_selected.join(", "))
        };

        let mut ordered: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // always_run agents take precedence over LLM selection (Open
        // Question decision, SPEC_FULL.md §4), then LLM picks fill the
        // remaining budget in ranked order.
        for name in &self.config.always_run {
            if self.agents.get(name).is_some() && seen.insert(name.clone()) {
                ordered.push(name.clone());
            }
        }

        let fallback_needed = llm_selected.is_empty();
        let source = if fallback_needed {
            vec![self.config.selection_fallback_agent.clone()]
        } else {
            llm_selected
        };

        for name in source {
            if seen.insert(name.clone()) {
                ordered.push(name);
            }
        }

        ordered.truncate(self.config.max_selected_agents);
        (ordered, rationale)
    }

    async fn dispatch(&self, query: &Query, selected: &[String]) -> Vec<AgentResult> {
        if self.config.allow_parallel_helpers {
            let futures = selected.iter().map(|name| self.run_one(query, name));
            futures::future::join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(selected.len());
            for name in selected {
                results.push(self.run_one(query, name).await);
            }
            results
        }
    }

    async fn run_one(&self, query: &Query, agent_name: &str) -> AgentResult {
        let Some(bundle) = self.agents.get(agent_name) else {
            return AgentResult::error(agent_name, "agent is not configured");
        };

        let deadline = bundle
            .deadline
            .min(self.config.per_agent_default)
            .min(self.config.per_agent_hard_cap);
        let task = AgentTask::new(agent_name, query.clone(), "context redacted upstream by the safety gate")
            .with_deadline(deadline)
            .with_max_iterations(bundle.max_iterations)
            .with_allowed_tools(bundle.allowed_tools.clone());

        let agent_loop = AgentLoop::new(
            self.llm.as_ref(),
            self.tool_registry.as_ref(),
            self.cache.as_ref(),
            self.transport.as_ref(),
            self.audit.as_ref(),
            IterationConfig::default(),
        );
        let journal = BufferedJournal::default();

        match tokio_timeout(deadline, agent_loop.run(&task, &bundle.system_prompt, &journal)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(agent = agent_name, error = %e, "agent run failed");
                AgentResult::error(agent_name, "this agent is temporarily unavailable")
            }
            Err(_) => AgentResult::timeout(agent_name),
        }
    }
}

fn outcome_for(result: &AgentResult) -> Outcome {
    use crate::types::AgentStatus;
    match result.status {
        AgentStatus::Ok | AgentStatus::Empty => Outcome::Ok,
        AgentStatus::Timeout => Outcome::Timeout,
        AgentStatus::Error => Outcome::Error,
        AgentStatus::SafetyBlocked => Outcome::Rejected,
    }
}

fn render_selection_prompt(query_text: &str, descriptions: &[(String, String)]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Select 1 to 3 agents best suited to this query, one name per line, from:\n");
    for (name, description) in descriptions {
        prompt.push_str(&format!("- {name}: {description}\n"));
    }
    prompt.push_str(&format!("\nQuery: {query_text}\n"));
    prompt
}

fn parse_agent_names(reply: &str, agents: &AgentRegistry) -> Vec<String> {
    reply
        .lines()
        .map(|line| line.trim().trim_start_matches('-').trim())
        .filter(|line| !line.is_empty())
        .filter(|line| agents.get(line).is_some())
        .map(str::to_string)
        .collect()
}
