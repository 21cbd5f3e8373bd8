//! Error taxonomy (§7). Kinds, not exception hierarchies — each subsystem
//! owns a leaf error enum; `RuntimeError` composes them at the crate root
//! the way the teacher's `types/error.rs` composes `ConfigError` /
//! `ResourceError` / ... into a single `RuntimeError`.

use thiserror::Error;

/// Tool transport (C1) errors.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("pool exhausted for category {category}: no idle connection within {timeout_ms}ms")]
    PoolExhausted { category: String, timeout_ms: u64 },

    #[error("tool '{tool}' unavailable after retries: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("broken pipe talking to tool server for '{tool}'")]
    BrokenPipe { tool: String },

    #[error("malformed response from tool server for '{tool}': {reason}")]
    MalformedResponse { tool: String, reason: String },

    #[error("failed to spawn tool server process '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },
}

/// Tool registry (C2) errors.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool listing failed: {0}")]
    ListingFailed(String),
}

/// Response cache (C3) errors.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Privacy/safety gate (C4) errors.
#[derive(Error, Debug, Clone)]
pub enum SafetyError {
    #[error("query rejected: protected health information detected under zero-tolerance policy")]
    PhiRejected,
}

/// Agent iteration controller (C5) errors.
#[derive(Error, Debug, Clone)]
pub enum AgentLoopError {
    #[error("agent '{agent}' exceeded its deadline")]
    Deadline { agent: String },

    #[error("agent '{agent}' step could not be parsed: {reason}")]
    UnparseableStep { agent: String, reason: String },
}

/// Orchestrator (C7) errors. Per §7, only `SafetyRejection` and
/// `ConfigurationError` are meant to surface to the caller as distinct
/// outcomes; everything else is recovered at a smaller boundary. This enum
/// exists for the two that do surface, plus `ConfigurationError`, detected
/// only at startup.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("safety rejection: {0}")]
    SafetyRejection(#[from] SafetyError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Synthesis (C8) errors. Synthesis is defined to never fail the request
/// (spec.md: "Always emit a `formatted_summary` even if every agent
/// failed"); this enum exists for completeness of the taxonomy and for
/// malformed-input cases that indicate a caller bug, not a runtime failure.
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error("no agent results supplied to synthesize")]
    NoResults,
}

/// Audit & metrics (C9) errors. Per §4.9, metric/audit writes are
/// non-blocking and must never fail the request — callers of the audit
/// sink log-and-continue on this error rather than propagate it.
#[derive(Error, Debug, Clone)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    SinkUnavailable(String),
}

/// Top-level error type composing every subsystem's errors.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("agent loop error: {0}")]
    AgentLoop(#[from] AgentLoopError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
