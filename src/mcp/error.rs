// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP error types.

use thiserror::Error;

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A configured server could not be launched or initialized.
    #[error("Failed to start MCP server '{server}': {source}")]
    ServerStart {
        server: String,
        #[source]
        source: Box<McpError>,
    },

    /// The server executable could not be spawned.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Spawn, handshake and tool discovery did not finish in time.
    #[error("MCP server '{server}' did not become ready within {timeout_secs}s")]
    StartupTimeout { server: String, timeout_secs: u64 },

    /// No live session for the named server.
    #[error("Unknown MCP server: {0}")]
    UnknownServer(String),

    /// Qualified tool name is not of the form `server.tool`.
    #[error("Invalid tool name '{0}': expected 'server.tool'")]
    InvalidToolName(String),

    /// The stdio pipe broke or the server exited.
    #[error("Transport error on '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// Protocol error (JSON-RPC).
    #[error("Protocol error: code={code}, message={message}")]
    Protocol { code: i64, message: String },

    /// Invalid response from server.
    #[error("Invalid response from MCP server: {0}")]
    InvalidResponse(String),

    /// Tool call timeout.
    #[error("Tool call '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    /// The tool answered with `isError: true`.
    #[error("Tool '{tool}' reported an error: {message}")]
    ToolReported { tool: String, message: String },

    /// All attempts for a tool call failed.
    #[error("Tool '{tool}' failed after {attempts} attempt(s): {source}")]
    ToolExecution {
        tool: String,
        attempts: u32,
        #[source]
        source: Box<McpError>,
    },

    /// One or more sessions failed to close cleanly.
    #[error("Failed to stop {} MCP server(s): {}", .failures.len(), format_failures(.failures))]
    Shutdown { failures: Vec<(String, String)> },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(server, reason)| format!("{}: {}", server, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl McpError {
    /// Create a server start error.
    pub fn server_start(server: impl Into<String>, source: McpError) -> Self {
        Self::ServerStart {
            server: server.into(),
            source: Box::new(source),
        }
    }

    /// Create a transport error.
    pub fn transport(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            server: server.into(),
            reason: reason.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Whether another attempt of the same call could succeed.
    ///
    /// Transport, protocol and timeout failures are transient. A tool that
    /// reported its own error, and name resolution failures, are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Protocol { .. }
                | Self::InvalidResponse(_)
                | Self::Timeout { .. }
                | Self::Io(_)
                | Self::Json(_)
        )
    }
}
