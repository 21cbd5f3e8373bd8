//! The orchestrator's external output shape (§6 Output response).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{AgentStatus, Citation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub selection_rationale: Option<String>,
    pub per_agent_status: HashMap<String, AgentStatus>,
}

/// Always present and non-empty: `formatted_summary` (§6, §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub formatted_summary: String,
    pub citations: Vec<Citation>,
    pub agents_consulted: Vec<String>,
    pub tools_invoked: Vec<String>,
    pub disclaimers: Vec<String>,
    pub provenance: Provenance,
}

impl Response {
    pub fn is_well_formed(&self) -> bool {
        !self.formatted_summary.is_empty()
    }
}
