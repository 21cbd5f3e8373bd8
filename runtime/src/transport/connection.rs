//! A single pooled subprocess connection (§3 Connection, §4.1).
//!
//! Lifecycle: spawned → initialized → idle → in_use → idle → drained →
//! terminated, with a side transition to unhealthy on broken-pipe, EOF,
//! ping failure, or timeout. Unhealthy connections are terminated, never
//! returned to the pool.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::time::timeout;

use crate::types::{ToolCategory, TransportError};

use super::protocol::{read_frame, write_frame, JsonRpcRequest};

/// How to spawn the subprocess backing one connection. Tool servers
/// themselves are external collaborators (§1 Non-goals); this is the
/// narrow seam the transport needs to start one.
#[derive(Debug, Clone)]
pub struct ToolServerSpec {
    pub category: ToolCategory,
    pub command: String,
    pub args: Vec<String>,
}

pub struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    pub category: ToolCategory,
    pub last_used: Instant,
    pub healthy: bool,
    pub in_flight: bool,
    initialized: bool,
    next_request_id: u64,
}

impl Connection {
    pub async fn spawn(spec: &ToolServerSpec, start_timeout: Duration) -> Result<Self, TransportError> {
        let mut command = tokio::process::Command::new(&spec.command);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Diagnostics must never share the pipes used for JSON-RPC frames (§4.1).
            .stderr(Stdio::piped());

        let mut child = timeout(start_timeout, async { command.spawn() })
            .await
            .map_err(|_| TransportError::SpawnFailed {
                command: spec.command.clone(),
                reason: "subprocess start timed out".into(),
            })?
            .map_err(|e| TransportError::SpawnFailed {
                command: spec.command.clone(),
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::SpawnFailed {
            command: spec.command.clone(),
            reason: "no stdin handle".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::SpawnFailed {
            command: spec.command.clone(),
            reason: "no stdout handle".into(),
        })?;

        // Drain stderr in the background so a chatty child never blocks on
        // a full pipe; we never parse this stream (§4.1).
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut lines = tokio::io::BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "tool_server_stderr", "{line}");
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            category: spec.category,
            last_used: Instant::now(),
            healthy: true,
            in_flight: false,
            initialized: false,
            next_request_id: 0,
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Send one `tools/call`-shaped request and read exactly one reply,
    /// bounded by `call_timeout`. On timeout the in-flight read is
    /// abandoned and the connection is marked unhealthy by the caller —
    /// the subprocess cannot be safely resumed once its output stream is
    /// desynchronized (§4.1 Cancellation).
    pub async fn request(
        &mut self,
        method: &str,
        params: serde_json::Value,
        call_timeout: Duration,
    ) -> Result<serde_json::Value, TransportError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method, params);

        let result = timeout(call_timeout, async {
            write_frame(&mut self.stdin, &request)
                .await
                .map_err(|_| TransportError::BrokenPipe {
                    tool: method.to_string(),
                })?;
            read_frame(&mut self.stdout).await.map_err(|_| TransportError::MalformedResponse {
                tool: method.to_string(),
                reason: "non-JSON or unparseable frame".into(),
            })
        })
        .await;

        self.last_used = Instant::now();

        match result {
            Err(_) => {
                self.healthy = false;
                Err(TransportError::ToolTimeout {
                    tool: method.to_string(),
                    timeout_ms: call_timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                self.healthy = false;
                Err(e)
            }
            Ok(Ok(None)) => {
                self.healthy = false;
                Err(TransportError::BrokenPipe {
                    tool: method.to_string(),
                })
            }
            Ok(Ok(Some(response))) => {
                if let Some(error) = response.error {
                    // A well-formed JSON-RPC error reply is not a framing
                    // failure — the connection stays healthy.
                    Err(TransportError::ToolUnavailable {
                        tool: method.to_string(),
                        reason: error.message,
                    })
                } else {
                    Ok(response.result.unwrap_or(serde_json::Value::Null))
                }
            }
        }
    }

    pub async fn ensure_initialized(&mut self, call_timeout: Duration) -> Result<(), TransportError> {
        if self.initialized {
            return Ok(());
        }
        self.request("initialize", serde_json::json!({}), call_timeout).await?;
        self.initialized = true;
        Ok(())
    }

    /// Lightweight health check used before reuse (§4.1 ping).
    pub async fn ping(&mut self, call_timeout: Duration) -> bool {
        match self.request("tools/list", serde_json::json!({}), call_timeout).await {
            Ok(_) => true,
            Err(_) => {
                self.healthy = false;
                false
            }
        }
    }

    /// Graceful termination: SIGTERM, wait up to `grace`, then SIGKILL (§4.1).
    pub async fn terminate(mut self, grace: Duration) {
        #[cfg(unix)]
        {
            if let Some(id) = self.child.id() {
                unsafe {
                    libc::kill(id as i32, libc::SIGTERM);
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        if timeout(grace, self.child.wait()).await.is_err() {
            let _ = self.child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `cat` echoes each stdin line back on stdout unmodified, so it stands
    /// in for a well-behaved tool server that always returns a single
    /// JSON-RPC-shaped line per request — good enough to exercise real
    /// process framing without depending on an external tool binary.
    fn echo_spec() -> ToolServerSpec {
        ToolServerSpec {
            category: ToolCategory::General,
            command: "cat".into(),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn spawn_and_terminate_real_process() {
        let conn = Connection::spawn(&echo_spec(), Duration::from_secs(5)).await.unwrap();
        assert!(conn.healthy);
        conn.terminate(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn request_times_out_against_a_silent_process() {
        // `sleep` never writes anything to stdout, so any request should
        // hit the call timeout and mark the connection unhealthy.
        let spec = ToolServerSpec {
            category: ToolCategory::General,
            command: "sleep".into(),
            args: vec!["5".into()],
        };
        let mut conn = Connection::spawn(&spec, Duration::from_secs(5)).await.unwrap();
        let result = conn
            .request("tools/list", serde_json::json!({}), Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(TransportError::ToolTimeout { .. })));
        assert!(!conn.healthy);
        conn.terminate(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn request_against_closed_process_is_broken_pipe() {
        // `true` exits immediately, closing stdout — the first request
        // should observe EOF and be treated as a broken pipe.
        let spec = ToolServerSpec {
            category: ToolCategory::General,
            command: "true".into(),
            args: vec![],
        };
        let mut conn = Connection::spawn(&spec, Duration::from_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = conn
            .request("tools/list", serde_json::json!({}), Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert!(!conn.healthy);
        conn.terminate(Duration::from_secs(1)).await;
    }
}
