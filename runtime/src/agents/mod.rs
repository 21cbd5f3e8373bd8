//! Domain Agents (C6): explicit bundles of name, system prompt, tool
//! allow-list, default arguments, and deadline — registered by hand, never
//! discovered by walking modules (§9 Design Notes).

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentBundle {
    pub name: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub default_args: HashMap<String, serde_json::Value>,
    pub deadline: Duration,
    pub max_iterations: u32,
}

/// Explicit, process-lifetime registry of the agents this core knows how
/// to run (§4.6). Agents declare themselves here; nothing is discovered
/// dynamically.
pub struct AgentRegistry {
    bundles: HashMap<String, AgentBundle>,
}

impl AgentRegistry {
    pub fn with_default_agents() -> Self {
        let mut bundles = HashMap::new();

        bundles.insert(
            "medical_literature_search".to_string(),
            AgentBundle {
                name: "medical_literature_search".to_string(),
                system_prompt: concat!(
                    "You are a medical literature search agent. Prefer the locally-mirrored ",
                    "corpus before external services. Always produce a synthesized narrative, ",
                    "never a raw list of sources. Cite DOIs or PMIDs when available."
                )
                .to_string(),
                allowed_tools: vec![
                    "literature-search".to_string(),
                    "clinical-trials".to_string(),
                    "drug-information".to_string(),
                ],
                default_args: HashMap::new(),
                deadline: Duration::from_secs(45),
                max_iterations: 8,
            },
        );

        bundles.insert(
            "clinical_research".to_string(),
            AgentBundle {
                name: "clinical_research".to_string(),
                system_prompt: concat!(
                    "You are a clinical research agent. Combine literature search, clinical ",
                    "trial data, and enriched NER output to produce a research summary with ",
                    "evidence grading and relationship hints. Never return raw records."
                )
                .to_string(),
                allowed_tools: vec![
                    "literature-search".to_string(),
                    "clinical-trials".to_string(),
                    "ner-analyze".to_string(),
                ],
                default_args: HashMap::from([("enrich".to_string(), serde_json::json!(true))]),
                deadline: Duration::from_secs(45),
                max_iterations: 8,
            },
        );

        bundles.insert(
            "intake".to_string(),
            AgentBundle {
                name: "intake".to_string(),
                system_prompt: concat!(
                    "You are an administrative intake agent. You have no tools available: work ",
                    "only from the supplied text. Produce a structured administrative intake ",
                    "summary. Refuse requests for medical advice and say so plainly."
                )
                .to_string(),
                allowed_tools: Vec::new(),
                default_args: HashMap::new(),
                deadline: Duration::from_secs(20),
                max_iterations: 3,
            },
        );

        bundles.insert(
            "document_processor".to_string(),
            AgentBundle {
                name: "document_processor".to_string(),
                system_prompt: concat!(
                    "You are a document processing agent. Use named-entity recognition to ",
                    "produce an entity-annotated, de-identified rendering of the supplied ",
                    "document. Never echo unredacted identifiers."
                )
                .to_string(),
                allowed_tools: vec!["ner-analyze".to_string()],
                default_args: HashMap::new(),
                deadline: Duration::from_secs(30),
                max_iterations: 5,
            },
        );

        Self { bundles }
    }

    pub fn get(&self, name: &str) -> Option<&AgentBundle> {
        self.bundles.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bundles.keys().map(String::as_str).collect()
    }

    /// Short descriptions fed into the selection prompt (§4.7 step 2).
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.bundles
            .values()
            .map(|b| (b.name.clone(), first_sentence(&b.system_prompt)))
            .collect()
    }
}

fn first_sentence(text: &str) -> String {
    text.split('.').next().unwrap_or(text).trim().to_string()
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::with_default_agents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_required_agents() {
        let registry = AgentRegistry::with_default_agents();
        for name in [
            "medical_literature_search",
            "clinical_research",
            "intake",
            "document_processor",
        ] {
            assert!(registry.get(name).is_some(), "missing agent {name}");
        }
    }

    #[test]
    fn intake_agent_has_no_tools() {
        let registry = AgentRegistry::with_default_agents();
        assert!(registry.get("intake").unwrap().allowed_tools.is_empty());
    }
}
