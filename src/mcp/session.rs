// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A live connection to one tool server process.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::McpError;
use super::transport::StdioTransport;
use super::types::{CallToolResult, ServerInfo, ToolDescriptor, PROTOCOL_VERSION};
use crate::config::ServerSpec;

/// How long `close` waits for the process to exit after stdin closes.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages, guarding against a cursor loop.
const MAX_LIST_PAGES: usize = 64;

/// Client session for a single server.
pub struct Session {
    /// Server name.
    name: String,

    /// Child process handle.
    child: Mutex<Child>,

    /// JSON-RPC transport over the child's stdio.
    transport: StdioTransport,

    /// Server info from the handshake.
    server_info: ServerInfo,

    /// Tools advertised at connect time.
    tools: Vec<ToolDescriptor>,

    /// Cleared once `close` starts.
    live: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("server_info", &self.server_info)
            .field("tools", &self.tools.len())
            .field("live", &self.is_live())
            .finish()
    }
}

impl Session {
    /// Spawn the server, perform the handshake and discover its tools.
    ///
    /// The whole sequence is bounded by `startup_timeout_sec`. If it
    /// fails, the child is killed when the half-built session is dropped.
    pub async fn connect(spec: &ServerSpec) -> Result<Self, McpError> {
        let timeout_secs = spec.startup_timeout_sec;
        tokio::time::timeout(Duration::from_secs(timeout_secs), Self::connect_inner(spec))
            .await
            .map_err(|_| McpError::StartupTimeout {
                server: spec.name.clone(),
                timeout_secs,
            })?
    }

    async fn connect_inner(spec: &ServerSpec) -> Result<Self, McpError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport(&spec.name, "failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport(&spec.name, "failed to capture stdout"))?;
        let transport = StdioTransport::new(&spec.name, stdin, stdout);

        let init = transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "conductor",
                        "version": crate::VERSION
                    }
                })),
            )
            .await?;
        let server_info = ServerInfo::from_initialize(&init);
        transport.notify("notifications/initialized", None).await?;

        let tools = list_tools(&spec.name, &transport).await?;
        debug!(
            server = %spec.name,
            remote = %server_info.name,
            tools = tools.len(),
            "MCP session ready"
        );

        Ok(Self {
            name: spec.name.clone(),
            child: Mutex::new(child),
            transport,
            server_info,
            tools,
            live: AtomicBool::new(true),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get server info from the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Get advertised tools.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Check if the session accepts calls.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Call a tool on this server. No timeout is applied here.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        if !self.is_live() {
            return Err(McpError::UnknownServer(self.name.clone()));
        }
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({
                    "name": tool,
                    "arguments": arguments
                })),
            )
            .await?;
        Ok(CallToolResult::from_wire(&result))
    }

    /// Close stdin, give the process [`SHUTDOWN_GRACE`] to exit, then kill it.
    pub async fn close(&self) -> Result<(), McpError> {
        self.live.store(false, Ordering::Release);
        self.transport.close_stdin().await;

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.name, %status, "MCP server exited");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(server = %self.name, error = %e, "Wait failed, killing MCP server");
                child.kill().await?;
                Ok(())
            }
            Err(_) => {
                warn!(server = %self.name, "MCP server did not exit in time, killing");
                child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Fetch every page of `tools/list`.
async fn list_tools(server: &str, transport: &StdioTransport) -> Result<Vec<ToolDescriptor>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
        let result = transport.request("tools/list", params).await?;

        let page = result
            .get("tools")
            .and_then(|t| t.as_array())
            .ok_or_else(|| McpError::InvalidResponse("tools/list result has no tools array".to_string()))?;
        tools.extend(page.iter().filter_map(|t| ToolDescriptor::from_wire(server, t)));

        cursor = result
            .get("nextCursor")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());
        if cursor.is_none() {
            return Ok(tools);
        }
    }

    warn!(server, "tools/list pagination did not terminate, keeping what was listed");
    Ok(tools)
}
