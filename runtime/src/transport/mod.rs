//! Tool Transport (C1): line-framed JSON-RPC over pooled tool-server
//! subprocesses, with retry-with-backoff on transient failures.

pub mod connection;
pub mod pool;
pub mod protocol;

use std::collections::HashMap;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::{AuditTrail, EventKind, Outcome};
use crate::types::{SessionId, ToolCategory, ToolResponseEnvelope, TransportError};

pub use connection::ToolServerSpec;
pub use pool::ConnectionPool;

/// Retries a `ToolTimeout`/`BrokenPipe`/`MalformedResponse` call up to this
/// many additional times before giving up (§4.1: retry transient failures,
/// never retry on a clean JSON-RPC error reply).
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// How C1 is invoked by the registry (C2) and the agent loop (C5). Kept as
/// a trait so tests can substitute a deterministic in-memory transport
/// without spawning real subprocesses.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn call_tool(
        &self,
        category: ToolCategory,
        tool_name: &str,
        arguments: serde_json::Value,
        call_timeout: Duration,
    ) -> Result<ToolResponseEnvelope, TransportError>;
}

pub struct DefaultToolTransport {
    pool: ConnectionPool,
    /// Transport-level retries happen below any session context, so retry
    /// events are recorded against this sentinel session rather than
    /// threading a session id through every `call_tool` invocation.
    audit: Option<Arc<AuditTrail>>,
}

const TRANSPORT_AUDIT_SESSION: &str = "transport";

impl DefaultToolTransport {
    pub fn new(
        specs: HashMap<ToolCategory, ToolServerSpec>,
        capacity: usize,
        acquire_deadline: Duration,
        breaker_cooldown: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(specs, capacity, acquire_deadline, breaker_cooldown, ping_timeout),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }
}

#[async_trait]
impl ToolTransport for DefaultToolTransport {
    async fn call_tool(
        &self,
        category: ToolCategory,
        tool_name: &str,
        arguments: serde_json::Value,
        call_timeout: Duration,
    ) -> Result<ToolResponseEnvelope, TransportError> {
        let mut attempt = 0u32;
        loop {
            let mut conn = self.pool.acquire(category).await?;

            let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
            let result = conn.request("tools/call", params, call_timeout).await;

            let retryable = matches!(
                result,
                Err(TransportError::BrokenPipe { .. })
                    | Err(TransportError::MalformedResponse { .. })
            );
            let succeeded = result.is_ok();
            self.pool.release(category, conn, succeeded).await;

            match result {
                Ok(value) => {
                    let payload: serde_json::Value = value;
                    return Ok(ToolResponseEnvelope::wrapping(&payload));
                }
                Err(e) if retryable && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(tool = tool_name, attempt, error = %e, "retrying tool call");
                    if let Some(audit) = &self.audit {
                        audit.emit(
                            &SessionId::new(TRANSPORT_AUDIT_SESSION),
                            "transport",
                            EventKind::ToolRetry,
                            Outcome::Error,
                            None,
                            serde_json::json!({"tool": tool_name, "attempt": attempt, "reason": e.to_string()}),
                        );
                    }
                    tokio::time::sleep(BACKOFF_BASE * attempt).await;
                    continue;
                }
                // Timeouts are never retried (§4.1): the subprocess's output
                // stream may be desynchronized, so the connection is
                // discarded, not retried against.
                Err(e) => return Err(e),
            }
        }
    }
}

/// Deterministic canned-response transport for demos and tests, selected
/// by `options.mock` on the inbound `Query` (§6).
#[cfg(any(test, feature = "test-support"))]
pub struct MockToolTransport {
    pub fixtures: std::collections::HashMap<String, serde_json::Value>,
}

#[cfg(any(test, feature = "test-support"))]
impl MockToolTransport {
    pub fn new(fixtures: std::collections::HashMap<String, serde_json::Value>) -> Self {
        Self { fixtures }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ToolTransport for MockToolTransport {
    async fn call_tool(
        &self,
        _category: ToolCategory,
        tool_name: &str,
        _arguments: serde_json::Value,
        _call_timeout: Duration,
    ) -> Result<ToolResponseEnvelope, TransportError> {
        match self.fixtures.get(tool_name) {
            Some(payload) => Ok(ToolResponseEnvelope::wrapping(payload)),
            None => Err(TransportError::ToolUnavailable {
                tool: tool_name.to_string(),
                reason: "no fixture registered for this tool".to_string(),
            }),
        }
    }
}
