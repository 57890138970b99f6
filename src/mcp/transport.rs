// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line-delimited JSON-RPC over a child process's stdio.
//!
//! One JSON object per line in each direction. Lines on stdout that are not
//! JSON-RPC responses (server log noise) and responses to other ids are
//! skipped while waiting for a reply.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tracing::trace;

use super::error::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Bi-directional JSON-RPC transport for one server.
pub struct StdioTransport {
    server: String,
    next_id: AtomicU64,
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Create a transport from a child's stdin/stdout.
    pub fn new(server: impl Into<String>, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server: server.into(),
            next_id: AtomicU64::new(1),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    /// Get the next request ID.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for the response with the matching id.
    ///
    /// Returns the `result` value, or a protocol error for a JSON-RPC error.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_request_id();
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        self.write_line(&line).await?;

        let mut reader = self.reader.lock().await;
        let mut buf = String::new();
        loop {
            buf.clear();
            let read = reader
                .read_line(&mut buf)
                .await
                .map_err(|e| McpError::transport(&self.server, format!("read failed: {}", e)))?;
            if read == 0 {
                return Err(McpError::transport(
                    &self.server,
                    "stdout closed (server exited)",
                ));
            }

            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.answers(id) => return extract_result(resp),
                Ok(_) => trace!(server = %self.server, "Skipping response for another request"),
                Err(_) => trace!(server = %self.server, line = trimmed, "Skipping non JSON-RPC line"),
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.write_line(&line).await
    }

    /// Close stdin so the server sees EOF. Idempotent.
    pub async fn close_stdin(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut stdin) = writer.take() {
            let _ = stdin.shutdown().await;
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut guard = self.writer.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| McpError::transport(&self.server, "stdin already closed"))?;

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::transport(&self.server, format!("write failed: {}", e)))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::transport(&self.server, format!("write failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::transport(&self.server, format!("flush failed: {}", e)))?;
        Ok(())
    }
}

/// Turn a response into its result, mapping JSON-RPC errors.
pub fn extract_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::protocol(err.code, err.message));
    }
    response
        .result
        .ok_or_else(|| McpError::InvalidResponse("response has neither result nor error".to_string()))
}
