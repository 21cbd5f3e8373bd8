//! Tool Registry (C2): enumerates available tools, categorizes them, and
//! caches the listing for a session's lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::transport::ToolTransport;
use crate::types::{RegistryError, SessionId, ToolCategory, ToolDescriptor};

/// Table-driven categorization: exact tool name, or name prefix, to
/// category. Checked in order; first match wins (§4.2).
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub prefix: String,
    pub category: ToolCategory,
}

pub struct ToolRegistry {
    transport: Arc<dyn ToolTransport>,
    rules: Vec<CategoryRule>,
    /// Known descriptors by tool name, static configuration seeded at
    /// startup (tool servers don't change shape mid-session in this core).
    descriptors: HashMap<String, ToolDescriptor>,
    /// Per-session cached listing, built lazily on first contact (§4.2).
    session_listings: DashMap<SessionId, Vec<ToolDescriptor>>,
    list_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        descriptors: HashMap<String, ToolDescriptor>,
        rules: Vec<CategoryRule>,
        list_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            rules,
            descriptors,
            session_listings: DashMap::new(),
            list_timeout,
        }
    }

    pub fn categorize(&self, tool_name: &str) -> ToolCategory {
        for rule in &self.rules {
            if tool_name.starts_with(rule.prefix.as_str()) {
                return rule.category;
            }
        }
        ToolCategory::General
    }

    pub fn descriptor(&self, tool_name: &str) -> Result<&ToolDescriptor, RegistryError> {
        self.descriptors
            .get(tool_name)
            .ok_or_else(|| RegistryError::UnknownTool(tool_name.to_string()))
    }

    /// Enumerate tools, optionally filtered to one category. On first
    /// contact for a session this issues `tools/list` against every
    /// configured category and caches the union for the session's
    /// lifetime (§4.2).
    pub async fn list_tools(
        &self,
        session_id: &SessionId,
        category: Option<ToolCategory>,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        if let Some(cached) = self.session_listings.get(session_id) {
            return Ok(Self::filter(&cached, category));
        }

        let mut discovered: Vec<ToolDescriptor> = Vec::new();
        let mut categories: Vec<ToolCategory> = self
            .descriptors
            .values()
            .map(|d| d.category)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        categories.sort_by_key(|c| c.to_string());

        for cat in categories {
            match self
                .transport
                .call_tool(cat, "tools/list", serde_json::json!({}), self.list_timeout)
                .await
            {
                Ok(envelope) => {
                    let records = envelope.parse_records("tools");
                    for record in records {
                        if let Some(name) = record.get("name").and_then(|v| v.as_str()) {
                            if let Some(descriptor) = self.descriptors.get(name) {
                                discovered.push(descriptor.clone());
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(category = %cat, error = %e, "tools/list failed for category");
                }
            }
        }

        if discovered.is_empty() {
            // No tool server answered; fall back to the static descriptor
            // table rather than leaving the session with nothing (§4.2
            // does not mandate a hard failure here, only that discovery
            // happen once per session).
            discovered = self.descriptors.values().cloned().collect();
        }

        self.session_listings.insert(session_id.clone(), discovered.clone());
        Ok(Self::filter(&discovered, category))
    }

    fn filter(descriptors: &[ToolDescriptor], category: Option<ToolCategory>) -> Vec<ToolDescriptor> {
        match category {
            Some(cat) => descriptors.iter().filter(|d| d.category == cat).cloned().collect(),
            None => descriptors.to_vec(),
        }
    }

    /// Drop a session's cached listing. Called when the session ends.
    pub fn end_session(&self, session_id: &SessionId) {
        self.session_listings.remove(session_id);
    }
}
