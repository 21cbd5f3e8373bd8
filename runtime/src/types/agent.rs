//! Agent-facing data model (§3: AgentTask, AgentStep, AgentResult, Citation)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::query::Query;

/// Unique identifier for a single agent task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentTaskId(pub Uuid);

impl AgentTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentTaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of work dispatched to C5 for one selected agent (§3, §4.7 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: AgentTaskId,
    pub agent_name: String,
    pub query: Query,
    /// A safe context summary handed to the agent (PHI already redacted by C4).
    pub context: String,
    pub deadline: Duration,
    pub max_iterations: u32,
    pub allowed_tools: Vec<String>,
}

impl AgentTask {
    pub fn new(agent_name: impl Into<String>, query: Query, context: impl Into<String>) -> Self {
        Self {
            id: AgentTaskId::new(),
            agent_name: agent_name.into(),
            query,
            context: context.into(),
            deadline: Duration::from_secs(45),
            max_iterations: 8,
            allowed_tools: Vec::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }
}

/// An action the iteration controller's single reasoning step can produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentAction {
    CallTool { name: String, args: serde_json::Value },
    Answer { text: String },
}

/// One (thought, action, observation) turn of the ReAct loop, kept in the
/// agent's trace for downstream auditing and, on exhaustion, synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub iteration_index: u32,
    pub thought: String,
    pub action: AgentAction,
    pub observation: Option<String>,
}

/// Terminal status of one agent's run, surfaced to synthesis (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Ok,
    Timeout,
    Error,
    Empty,
    SafetyBlocked,
}

/// A reference to a primary source, with a deterministic dedup identity
/// (§3: DOI > PMID > URL > (title+year)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub primary_id: String,
    pub title: String,
    pub year: Option<u32>,
    pub journal: Option<String>,
    pub url_primary: String,
    pub url_fallback: Option<String>,
    pub snippet: Option<String>,
    /// Non-empty DOI, when known, regardless of what `primary_id` holds —
    /// kept separate so dedup precedence can distinguish DOI from PMID/NCT
    /// even when `primary_id` was populated from a lower-precedence field.
    pub doi: Option<String>,
    pub pmid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Article,
    Trial,
    Drug,
    Guideline,
}

impl Citation {
    /// The precedence-ordered dedup key described in §3.
    pub fn dedup_key(&self) -> String {
        if let Some(doi) = &self.doi {
            return format!("doi:{}", doi.to_lowercase());
        }
        if let Some(pmid) = &self.pmid {
            return format!("pmid:{pmid}");
        }
        if !self.url_primary.is_empty() {
            return format!("url:{}", self.url_primary);
        }
        format!("titleyear:{}:{}", self.title.to_lowercase(), self.year.unwrap_or(0))
    }
}

/// The outcome of a single agent task, as consumed by synthesis (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub status: AgentStatus,
    /// Mandatory whenever `status != SafetyBlocked` (§3 invariant).
    pub formatted_summary: String,
    pub raw_payload: Option<serde_json::Value>,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub disclaimers_needed: bool,
    pub error: Option<String>,
    pub tools_invoked: Vec<String>,
}

impl AgentResult {
    pub fn ok(agent_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Ok,
            formatted_summary: summary.into(),
            raw_payload: None,
            citations: Vec::new(),
            confidence: 0.5,
            disclaimers_needed: true,
            error: None,
            tools_invoked: Vec::new(),
        }
    }

    pub fn timeout(agent_name: impl Into<String>) -> Self {
        let name = agent_name.into();
        Self {
            formatted_summary: format!("{name} timed out; partial findings below if any"),
            agent_name: name,
            status: AgentStatus::Timeout,
            raw_payload: None,
            citations: Vec::new(),
            confidence: 0.0,
            disclaimers_needed: true,
            error: None,
            tools_invoked: Vec::new(),
        }
    }

    pub fn error(agent_name: impl Into<String>, user_safe_message: impl Into<String>) -> Self {
        let msg = user_safe_message.into();
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Error,
            formatted_summary: msg.clone(),
            raw_payload: None,
            citations: Vec::new(),
            confidence: 0.0,
            disclaimers_needed: false,
            error: Some(msg),
            tools_invoked: Vec::new(),
        }
    }

    pub fn safety_blocked(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::SafetyBlocked,
            formatted_summary: String::new(),
            raw_payload: None,
            citations: Vec::new(),
            confidence: 0.0,
            disclaimers_needed: true,
            error: None,
            tools_invoked: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_tools_invoked(mut self, tools: Vec<String>) -> Self {
        self.tools_invoked = tools;
        self
    }
}
