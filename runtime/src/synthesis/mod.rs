//! Synthesis (C8): picks a primary summary, deduplicates citations across
//! agents, and attaches a provenance block (§4.8).

use std::collections::HashMap;

use crate::agent_loop::dedup_citations;
use crate::safety::SafetyGate;
use crate::types::{AgentResult, AgentStatus, Citation, Provenance, Response};

const GENERIC_FALLBACK: &str = "Our services are temporarily limited and could not produce a detailed answer right now. Please try again shortly.";

/// Ordered preference for which agent's summary leads the response,
/// configurable (§4.8, §6 `synthesis.agent_priority`).
pub fn default_agent_priority() -> Vec<String> {
    vec![
        "medical_literature_search".to_string(),
        "clinical_research".to_string(),
        "document_processor".to_string(),
        "intake".to_string(),
    ]
}

pub struct Synthesizer {
    agent_priority: Vec<String>,
}

impl Synthesizer {
    pub fn new(agent_priority: Vec<String>) -> Self {
        Self { agent_priority }
    }

    pub fn synthesize(
        &self,
        results: &[AgentResult],
        safety: &SafetyGate,
        selection_rationale: Option<String>,
    ) -> Response {
        let primary_summary = self.pick_primary_summary(results);

        let mut citations: Vec<Citation> = results.iter().flat_map(|r| r.citations.clone()).collect();
        citations = dedup_citations(citations);
        order_citations(&mut citations);

        let agents_consulted: Vec<String> = results.iter().map(|r| r.agent_name.clone()).collect();
        let tools_invoked: Vec<String> = results
            .iter()
            .flat_map(|r| r.tools_invoked.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        // Every response from this core carries medical content in some
        // form, even a failure fallback (§8: "∀ responses R involving
        // medical content: at least one disclaimer is present").
        let disclaimers = vec![safety.disclaimer(None, None, None)];

        let per_agent_status: HashMap<String, AgentStatus> =
            results.iter().map(|r| (r.agent_name.clone(), r.status)).collect();

        Response {
            formatted_summary: primary_summary,
            citations,
            agents_consulted,
            tools_invoked,
            disclaimers,
            provenance: Provenance {
                selection_rationale,
                per_agent_status,
            },
        }
    }

    fn pick_primary_summary(&self, results: &[AgentResult]) -> String {
        for name in &self.agent_priority {
            if let Some(result) = results.iter().find(|r| &r.agent_name == name) {
                if !result.formatted_summary.is_empty() {
                    return result.formatted_summary.clone();
                }
            }
        }

        // Priority list exhausted without a usable summary: fall back to
        // the first non-empty summary in result order.
        if let Some(result) = results.iter().find(|r| !r.formatted_summary.is_empty()) {
            return result.formatted_summary.clone();
        }

        GENERIC_FALLBACK.to_string()
    }
}

/// DOI links first, then PMID/trial links (§4.8).
fn order_citations(citations: &mut [Citation]) {
    citations.sort_by_key(|c| if c.doi.is_some() { 0 } else { 1 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CitationKind;

    fn citation(doi: Option<&str>, pmid: Option<&str>, title: &str) -> Citation {
        Citation {
            kind: CitationKind::Article,
            primary_id: title.to_string(),
            title: title.to_string(),
            year: Some(2021),
            journal: None,
            url_primary: String::new(),
            url_fallback: None,
            snippet: None,
            doi: doi.map(str::to_string),
            pmid: pmid.map(str::to_string),
        }
    }

    #[test]
    fn primary_summary_follows_agent_priority() {
        let synthesizer = Synthesizer::new(default_agent_priority());
        let results = vec![
            AgentResult::ok("intake", "intake summary"),
            AgentResult::ok("medical_literature_search", "literature summary"),
        ];
        let gate = crate::safety::SafetyGate::new(crate::safety::SafetyMode::Redact, &[]);
        let response = synthesizer.synthesize(&results, &gate, None);
        assert_eq!(response.formatted_summary, "literature summary");
    }

    #[test]
    fn all_agents_failed_falls_back_to_generic_message() {
        let synthesizer = Synthesizer::new(default_agent_priority());
        let results = vec![
            AgentResult::error("medical_literature_search", ""),
            AgentResult::error("clinical_research", ""),
        ];
        let gate = crate::safety::SafetyGate::new(crate::safety::SafetyMode::Redact, &[]);
        let response = synthesizer.synthesize(&results, &gate, None);
        assert_eq!(response.formatted_summary, GENERIC_FALLBACK);
    }

    #[test]
    fn doi_citations_are_ordered_first() {
        let synthesizer = Synthesizer::new(default_agent_priority());
        let results = vec![AgentResult::ok("medical_literature_search", "s")
            .with_citations(vec![citation(None, Some("123"), "B"), citation(Some("10.1/x"), None, "A")])];
        let gate = crate::safety::SafetyGate::new(crate::safety::SafetyMode::Redact, &[]);
        let response = synthesizer.synthesize(&results, &gate, None);
        assert!(response.citations[0].doi.is_some());
    }

    #[test]
    fn response_is_always_well_formed() {
        let synthesizer = Synthesizer::new(default_agent_priority());
        let gate = crate::safety::SafetyGate::new(crate::safety::SafetyMode::Redact, &[]);
        let response = synthesizer.synthesize(&[], &gate, None);
        assert!(response.is_well_formed());
    }
}
