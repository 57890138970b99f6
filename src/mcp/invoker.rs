// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool invoker: one qualified call with bounded retry.
//!
//! The invoker resolves `server.tool`, calls the backend up to
//! `max_attempts` times with a fixed pause between transient failures,
//! normalizes the result and writes one log record per attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use super::error::McpError;
use super::hub::ToolBackend;
use super::types::ToolOutput;
use crate::runlog::{LogRecord, LogSink};

/// Retry settings for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Split `server.tool` on the first dot.
pub fn split_qualified(name: &str) -> Result<(&str, &str), McpError> {
    match name.split_once('.') {
        Some((server, tool)) if !server.is_empty() && !tool.is_empty() => Ok((server, tool)),
        _ => Err(McpError::InvalidToolName(name.to_string())),
    }
}

/// Executes qualified tool calls against a [`ToolBackend`].
#[derive(Clone)]
pub struct ToolInvoker {
    backend: Arc<dyn ToolBackend>,
    log: Arc<dyn LogSink>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ToolInvoker {
    pub fn new(backend: Arc<dyn ToolBackend>, log: Arc<dyn LogSink>) -> Self {
        Self {
            backend,
            log,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The backend this invoker calls.
    pub fn backend(&self) -> &Arc<dyn ToolBackend> {
        &self.backend
    }

    /// Execute `server.tool` with `arguments`.
    ///
    /// Name errors and unknown servers fail before any call is made. A tool
    /// that reports `isError` fails immediately. Transient failures are
    /// retried; when attempts run out the last error is wrapped in
    /// [`McpError::ToolExecution`].
    pub async fn execute(&self, qualified_name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        let (server, tool) = split_qualified(qualified_name)?;
        if !self.backend.is_connected(server) {
            return Err(McpError::UnknownServer(server.to_string()));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.backend.call_tool(server, tool, arguments.clone()).await;
            let elapsed = started.elapsed();

            let error = match result {
                Ok(result) if !result.is_error => {
                    let output = ToolOutput::from(&result);
                    self.record(server, tool, &arguments, &output.to_json_string(), elapsed, true);
                    debug!(tool = qualified_name, attempt, ?elapsed, "Tool call succeeded");
                    return Ok(output);
                }
                Ok(result) => McpError::ToolReported {
                    tool: qualified_name.to_string(),
                    message: result.as_text(),
                },
                Err(e) => e,
            };

            let summary = serde_json::json!({ "error": error.to_string() }).to_string();
            self.record(server, tool, &arguments, &summary, elapsed, false);

            if error.is_transient() && attempt < max_attempts {
                warn!(
                    tool = qualified_name,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Tool call failed, retrying"
                );
                tokio::time::sleep(self.policy.backoff).await;
                continue;
            }

            warn!(tool = qualified_name, attempts = attempt, error = %error, "Tool call failed");
            return Err(McpError::ToolExecution {
                tool: qualified_name.to_string(),
                attempts: attempt,
                source: Box::new(error),
            });
        }
    }

    fn record(&self, server: &str, tool: &str, args: &Value, output: &str, elapsed: Duration, success: bool) {
        let record = LogRecord::tool_call(server, tool, args, output, elapsed, success);
        if let Err(e) = self.log.write(&record) {
            warn!(error = %e, "Failed to write run log record");
        }
    }
}
