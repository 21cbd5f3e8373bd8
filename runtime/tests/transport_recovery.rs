//! Broken-pipe recovery: a tool server that dies mid-call is retried
//! against a freshly spawned replacement, and the retry is recorded in
//! the audit trail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use care_orchestrator_runtime::audit::{AuditTrail, EventKind, InMemoryAuditSink};
use care_orchestrator_runtime::transport::{DefaultToolTransport, ToolServerSpec, ToolTransport};
use care_orchestrator_runtime::types::ToolCategory;

/// Answers `initialize` every time it's spawned, but only answers the
/// first `tools/call` it ever receives process-wide (tracked via a shared
/// counter file) — modeling a tool server that dies partway through one
/// call and comes back healthy on the next spawn.
fn flaky_once_script(counter_file: &std::path::Path) -> ToolServerSpec {
    let script = r#"
read -r init_line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
n=$(cat "$1" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$1"
if [ "$n" = "1" ]; then
  exit 0
fi
read -r call_line
echo '{"jsonrpc":"2.0","id":2,"result":{"articles":[{"title":"demo"}]}}'
while read -r more_line; do
  echo '{"jsonrpc":"2.0","id":9,"result":{}}'
done
"#;
    ToolServerSpec {
        category: ToolCategory::Search,
        command: "sh".into(),
        args: vec![
            "-c".into(),
            script.into(),
            "sh".into(),
            counter_file.to_string_lossy().into_owned(),
        ],
    }
}

#[tokio::test]
async fn broken_pipe_is_recovered_by_respawning_and_retrying() {
    let counter_file = std::env::temp_dir().join(format!(
        "care-orchestrator-flaky-counter-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&counter_file);

    let mut specs = HashMap::new();
    specs.insert(ToolCategory::Search, flaky_once_script(&counter_file));

    let audit_sink = Arc::new(InMemoryAuditSink::default());
    let audit = Arc::new(AuditTrail::new(audit_sink.clone()));

    let transport = DefaultToolTransport::new(
        specs,
        2,
        Duration::from_secs(5),
        Duration::from_secs(30),
        Duration::from_secs(2),
    )
    .with_audit(audit.clone());

    let result = transport
        .call_tool(
            ToolCategory::Search,
            "literature-search",
            serde_json::json!({"query": "sglt2"}),
            Duration::from_secs(2),
        )
        .await;

    let envelope = result.expect("the second spawn should answer the call and the request should recover");
    let records = envelope.parse_records("articles");
    assert_eq!(records.len(), 1);

    let events = audit_sink.events();
    assert!(
        events.iter().any(|e| e.kind == EventKind::ToolRetry),
        "expected at least one tool_retry audit event, got {events:?}"
    );
    assert_eq!(audit.metrics.snapshot().retries, 1);

    let _ = std::fs::remove_file(&counter_file);
}
