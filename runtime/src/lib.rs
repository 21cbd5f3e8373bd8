//! Healthcare Query Orchestration Core.
//!
//! Wires the tool transport (C1), registry (C2), response cache (C3),
//! privacy/safety gate (C4), agent iteration controller (C5), domain
//! agents (C6), orchestrator (C7), synthesis (C8), and audit trail (C9)
//! into a single process-lifetime runtime.

pub mod agent_loop;
pub mod agents;
pub mod audit;
pub mod cache;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod registry;
pub mod safety;
pub mod synthesis;
pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use config::RuntimeConfig;
pub use types::{RuntimeError, RuntimeResult};

use agents::AgentRegistry;
use audit::{AuditTrail, TracingAuditSink};
use cache::ResponseCache;
use llm::{HttpLlmClient, LlmClient};
use orchestrator::{Orchestrator, OrchestratorConfig};
use registry::{CategoryRule, ToolRegistry};
use safety::SafetyGate;
use synthesis::Synthesizer;
use transport::{DefaultToolTransport, ToolTransport};
use types::{Query, Response, SessionId, ToolDescriptor};

/// Circuit-breaker cooldown (C1, supplemented per SPEC_FULL.md §2). Not
/// part of the §6 configuration surface, so kept as an internal constant
/// rather than a new config knob.
const CIRCUIT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Process-lifetime composition of every subsystem, analogous to the
/// teacher's top-level runtime object. One `AgentRuntime` is constructed
/// per process; sessions are scoped beneath it via `SessionId`.
pub struct AgentRuntime {
    orchestrator: Orchestrator,
    tool_registry: Arc<ToolRegistry>,
    cache: Arc<ResponseCache>,
    audit: Arc<AuditTrail>,
}

impl AgentRuntime {
    pub fn new(
        config: RuntimeConfig,
        tool_descriptors: std::collections::HashMap<String, ToolDescriptor>,
        category_rules: Vec<CategoryRule>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self::with_transport(config, tool_descriptors, category_rules, llm, None)
    }

    /// Like `new`, but allows substituting the tool transport — used by the
    /// CLI's mock demo mode, which has no real tool-server subprocesses to
    /// spawn.
    pub fn with_transport(
        config: RuntimeConfig,
        tool_descriptors: std::collections::HashMap<String, ToolDescriptor>,
        category_rules: Vec<CategoryRule>,
        llm: Option<Arc<dyn LlmClient>>,
        transport: Option<Arc<dyn ToolTransport>>,
    ) -> Self {
        let audit = Arc::new(AuditTrail::new(Arc::new(TracingAuditSink)));

        let transport: Arc<dyn ToolTransport> = transport.unwrap_or_else(|| {
            Arc::new(
                DefaultToolTransport::new(
                    config.tool_server_map(),
                    config.pool.capacity,
                    config.timeouts.pool_acquire,
                    CIRCUIT_BREAKER_COOLDOWN,
                    config.timeouts.per_tool,
                )
                .with_audit(audit.clone()),
            )
        });

        let tool_registry = Arc::new(ToolRegistry::new(
            transport.clone(),
            tool_descriptors,
            category_rules,
            config.timeouts.per_tool,
        ));

        let cache = Arc::new(ResponseCache::new(config.cache.per_session_max_entries));

        let llm: Arc<dyn LlmClient> = llm.unwrap_or_else(|| {
            let base = config.llm.base_url.clone().unwrap_or_else(|| "http://host:11434".to_string());
            Arc::new(HttpLlmClient::new(base))
        });

        let safety = SafetyGate::new(config.safety.mode.into(), &config.safety.extended_phi);
        let agents = AgentRegistry::with_default_agents();
        let synthesizer = Synthesizer::new(config.synthesis.agent_priority.clone());

        let orchestrator_config = OrchestratorConfig {
            router_timeout: config.timeouts.router,
            per_agent_default: config.timeouts.per_agent_default,
            per_agent_hard_cap: config.timeouts.per_agent_hard_cap,
            selection_fallback_agent: config.selection.fallback_agent.clone(),
            always_run: config.routing.always_run.clone(),
            allow_parallel_helpers: config.routing.allow_parallel_helpers,
            max_selected_agents: 3,
        };

        let orchestrator = Orchestrator::new(
            safety,
            llm,
            agents,
            tool_registry.clone(),
            cache.clone(),
            transport,
            synthesizer,
            audit.clone(),
            orchestrator_config,
        );

        Self {
            orchestrator,
            tool_registry,
            cache,
            audit,
        }
    }

    pub async fn handle_query(&self, query: Query) -> Response {
        self.orchestrator.handle(query).await
    }

    /// Drop a session's cached tool listing and response cache. Called by
    /// the owning front-end (out of scope here) when a conversation ends.
    pub fn end_session(&self, session_id: &SessionId) {
        self.tool_registry.end_session(session_id);
        self.cache.end_session(session_id);
    }

    pub fn metrics(&self) -> audit::MetricsSnapshot {
        self.audit.metrics.snapshot()
    }
}
