// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server connection manager.
//!
//! The hub owns one [`Session`] per started server, in configuration order,
//! plus the registry of every tool they advertised.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::error::McpError;
use super::registry::ToolRegistry;
use super::session::Session;
use super::types::{CallToolResult, ToolDescriptor};
use crate::config::{validate_server_name, ServerSpec};

/// Default bound on a single tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// What the invoker needs from a set of connected servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Check if `server` has a live session.
    fn is_connected(&self, server: &str) -> bool;

    /// Catalog of live tools, one `- server.tool: description` per line.
    fn tools_spec(&self) -> String;

    /// Call one tool on one server.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError>;
}

/// Manager for all server sessions of a run.
pub struct Hub {
    /// Servers to start, in configuration order.
    specs: Vec<ServerSpec>,

    /// Started sessions, in start order.
    sessions: Vec<Session>,

    /// Tools discovered across all sessions.
    registry: ToolRegistry,

    /// Bound on each tool call.
    tool_timeout: Duration,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("servers", &self.specs.len())
            .field("sessions", &self.sessions)
            .field("tools", &self.registry.len())
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

impl Hub {
    /// Create a hub for the given servers. Nothing is spawned until `start`.
    pub fn new(specs: Vec<ServerSpec>) -> Self {
        Self {
            specs,
            sessions: Vec::new(),
            registry: ToolRegistry::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Set the per-call timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Start every enabled server, in order.
    ///
    /// Stops at the first failure. Sessions started before it stay in the hub
    /// so that `stop` can close them.
    #[instrument(skip(self), fields(servers = self.specs.len()))]
    pub async fn start(&mut self) -> Result<(), McpError> {
        for spec in self.specs.iter().filter(|s| s.enabled) {
            if self.sessions.iter().any(|s| s.name() == spec.name) {
                continue;
            }

            validate_server_name(&spec.name)
                .map_err(|e| McpError::server_start(&spec.name, McpError::Config(e.to_string())))?;

            let session = Session::connect(spec)
                .await
                .map_err(|e| McpError::server_start(&spec.name, e))?;

            info!(
                server = %spec.name,
                tools = session.tools().len(),
                "Started MCP server"
            );
            self.registry.register_all(session.tools().iter().cloned());
            self.sessions.push(session);
        }
        Ok(())
    }

    fn session(&self, server: &str) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|s| s.name() == server && s.is_live())
    }

    /// Call a tool, bounded by the tool timeout.
    pub async fn call(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        let session = self
            .session(server)
            .ok_or_else(|| McpError::UnknownServer(server.to_string()))?;

        tokio::time::timeout(self.tool_timeout, session.call_tool(tool, arguments))
            .await
            .map_err(|_| McpError::Timeout {
                tool: format!("{}.{}", server, tool),
                timeout_secs: self.tool_timeout.as_secs(),
            })?
    }

    /// Close every session.
    ///
    /// Every close is attempted even after a failure; failures are reported
    /// together as [`McpError::Shutdown`].
    pub async fn stop(&self) -> Result<(), McpError> {
        let mut failures = Vec::new();
        for session in &self.sessions {
            if let Err(e) = session.close().await {
                warn!(server = %session.name(), error = %e, "Failed to stop MCP server");
                failures.push((session.name().to_string(), e.to_string()));
            }
        }

        if failures.is_empty() {
            info!(sessions = self.sessions.len(), "Stopped MCP servers");
            Ok(())
        } else {
            Err(McpError::Shutdown { failures })
        }
    }

    /// Tool catalog for the planner, live servers only, in registration order.
    pub fn available_tools_spec(&self) -> String {
        self.registry.render_filtered(|server| self.is_live(server))
    }

    /// Check if a server has a live session.
    pub fn is_live(&self, server: &str) -> bool {
        self.session(server).is_some()
    }

    /// All registered tools.
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.registry.iter()
    }

    /// Names of started servers, in start order.
    pub fn server_names(&self) -> Vec<&str> {
        self.sessions.iter().map(|s| s.name()).collect()
    }

    /// Bound on each tool call.
    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }
}

#[async_trait]
impl ToolBackend for Hub {
    fn is_connected(&self, server: &str) -> bool {
        self.is_live(server)
    }

    fn tools_spec(&self) -> String {
        self.available_tools_spec()
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        self.call(server, tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_creation() {
        let hub = Hub::new(vec![ServerSpec::stdio("demo", "echo")]);
        assert!(hub.server_names().is_empty());
        assert_eq!(hub.available_tools_spec(), "");
        assert_eq!(hub.tool_timeout(), DEFAULT_TOOL_TIMEOUT);
    }

    #[tokio::test]
    async fn test_call_unknown_server() {
        let hub = Hub::new(Vec::new());
        let err = hub.call("ghost", "search", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownServer(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_start_skips_disabled_servers() {
        let mut spec = ServerSpec::stdio("off", "conductor-no-such-binary-xyz");
        spec.enabled = false;
        let mut hub = Hub::new(vec![spec]);

        hub.start().await.unwrap();
        assert!(hub.server_names().is_empty());
        hub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_rejects_dotted_server_name() {
        let mut hub = Hub::new(vec![ServerSpec::stdio("my.srv", "conductor-no-such-binary-xyz")]);
        let err = hub.start().await.unwrap_err();
        match err {
            McpError::ServerStart { server, source } => {
                assert_eq!(server, "my.srv");
                assert!(matches!(*source, McpError::Config(ref m) if m.contains("must not contain '.'")));
            }
            other => panic!("expected ServerStart, got {other:?}"),
        }
        assert!(hub.server_names().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_names_server() {
        let mut hub = Hub::new(vec![ServerSpec::stdio("broken", "conductor-no-such-binary-xyz")]);
        let err = hub.start().await.unwrap_err();
        match err {
            McpError::ServerStart { server, source } => {
                assert_eq!(server, "broken");
                assert!(matches!(*source, McpError::Spawn { .. }));
            }
            other => panic!("expected ServerStart, got {other:?}"),
        }
        assert!(hub.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_on_empty_hub() {
        let hub = Hub::new(Vec::new());
        assert!(hub.stop().await.is_ok());
    }
}
