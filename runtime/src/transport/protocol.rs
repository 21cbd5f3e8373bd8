//! Line-framed JSON-RPC 2.0 wire protocol (§4.1, §6).
//!
//! The transport must never emit anything but JSON-RPC frames on the
//! child's stdin, one object per line, and must read exactly one line per
//! reply. Diagnostics never share this stream — they go to the child's
//! stderr, which the transport drains but does not parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A JSON-RPC 2.0 request frame.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response frame. Either `result` or `error` is present,
/// never both — this is not enforced structurally (the wire format allows
/// either to be absent/null) so callers check `error` first.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Write one request as a single newline-terminated line. This is the only
/// place the transport writes to a child's stdin, and it never writes
/// partial frames — the whole line is buffered then flushed in one write.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &JsonRpcRequest,
) -> std::io::Result<()> {
    let mut line = serde_json::to_string(request).map_err(std::io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Read exactly one newline-terminated line and parse it as a JSON-RPC
/// response. Returns `Ok(None)` on clean EOF (the child closed stdout
/// without writing a reply), which the caller treats as a broken-pipe
/// condition.
pub async fn read_frame<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<JsonRpcResponse>> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed: JsonRpcResponse = serde_json::from_str(trimmed).map_err(std::io::Error::other)?;
    Ok(Some(parsed))
}
