//! Audit & Metrics (C9): a structured, PHI-sanitized event log distinct
//! from operational `tracing`, plus non-blocking counters (§4.9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Selection,
    ToolCall,
    ToolRetry,
    AgentResult,
    FinalResponse,
    SafetyRejection,
    Emergency,
    PhiDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Timeout,
    Error,
    Rejected,
}

/// One structured audit record. `detail` must already be PHI-sanitized by
/// the caller — this module never inspects or redacts it (§4.9: "must
/// never contain raw query text if phi_found was true").
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub component: String,
    pub kind: EventKind,
    pub duration_ms: Option<u64>,
    pub outcome: Outcome,
    pub detail: serde_json::Value,
}

/// Monotonically-updated counters (§4.9). Plain atomics: metric writes
/// must be non-blocking and must never fail the request.
#[derive(Default)]
pub struct Metrics {
    pub agent_invocations: AtomicU64,
    pub tool_invocations: AtomicU64,
    pub cache_hits: AtomicU64,
    pub timeouts: AtomicU64,
    pub retries: AtomicU64,
    pub emergency_detections: AtomicU64,
    pub phi_detections: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            agent_invocations: self.agent_invocations.load(Ordering::Relaxed),
            tool_invocations: self.tool_invocations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            emergency_detections: self.emergency_detections.load(Ordering::Relaxed),
            phi_detections: self.phi_detections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub agent_invocations: u64,
    pub tool_invocations: u64,
    pub cache_hits: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub emergency_detections: u64,
    pub phi_detections: u64,
}

/// Sink for audit events. A trait so the CLI/tests can substitute an
/// in-memory sink; production would plug in a file or log-shipper-backed
/// one (left as the thinnest possible adapter, per the spec's silence on
/// concrete destinations).
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: emits each event as a structured `tracing` record at
/// info level, tagged distinctly from ordinary operational logs.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            session_id = %event.session_id,
            component = %event.component,
            kind = ?event.kind,
            outcome = ?event.outcome,
            duration_ms = event.duration_ms,
            detail = %event.detail,
            "audit event"
        );
    }
}

/// In-memory sink used by tests and the CLI demo path to inspect what was
/// recorded without standing up a real log pipeline.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

/// Facade C7/C5 call into for both metrics and the event log. Writes are
/// synchronous in-process but never return an error — a broken sink is
/// logged and swallowed, never surfaced to the caller (§4.9).
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    pub metrics: Metrics,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            metrics: Metrics::default(),
        }
    }

    pub fn emit(
        &self,
        session_id: &SessionId,
        component: &str,
        kind: EventKind,
        outcome: Outcome,
        duration_ms: Option<u64>,
        detail: serde_json::Value,
    ) {
        match kind {
            EventKind::ToolCall => {
                self.metrics.tool_invocations.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ToolRetry => {
                self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::Emergency => {
                self.metrics.emergency_detections.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::PhiDetected => {
                self.metrics.phi_detections.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::Selection | EventKind::AgentResult => {
                self.metrics.agent_invocations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if outcome == Outcome::Timeout {
            self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        self.sink.record(AuditEvent {
            timestamp: Utc::now(),
            session_id: session_id.0.clone(),
            component: component.to_string(),
            kind,
            duration_ms,
            outcome,
            detail,
        });
    }

    pub fn record_cache_hit(&self) {
        self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_updates_metrics_and_records_event() {
        let trail = AuditTrail::new(Arc::new(InMemoryAuditSink::default()));
        trail.emit(
            &SessionId::new("s1"),
            "orchestrator",
            EventKind::Emergency,
            Outcome::Ok,
            Some(5),
            serde_json::json!({"category": "cardiac"}),
        );
        assert_eq!(trail.metrics.snapshot().emergency_detections, 1);
    }

    #[test]
    fn cache_hit_is_counted() {
        let trail = AuditTrail::new(Arc::new(InMemoryAuditSink::default()));
        trail.record_cache_hit();
        trail.record_cache_hit();
        assert_eq!(trail.metrics.snapshot().cache_hits, 2);
    }
}
