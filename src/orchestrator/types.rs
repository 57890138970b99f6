// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Types for the orchestration loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::{Settings, DEFAULT_STRATEGY_HINT};
use crate::mcp::{McpError, ToolOutput};
use crate::planner::PlanDecision;
use crate::types::Message;

/// Configuration for the orchestration loop.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Planning calls per run before stopping.
    pub max_steps: usize,

    /// Characters of tool output JSON fed back into the transcript.
    pub observation_chars: usize,

    /// Guidance appended to the system prompt.
    pub strategy_hint: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            observation_chars: 1500,
            strategy_hint: DEFAULT_STRATEGY_HINT.to_string(),
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_steps: settings.max_steps,
            observation_chars: settings.observation_chars,
            strategy_hint: settings.strategy_hint.clone(),
        }
    }
}

/// What a run should achieve.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Goal {
    pub text: String,

    /// Optional working mode, e.g. `brief` or `deep-dive`.
    pub mode: Option<String>,

    /// Optional output requirement, e.g. a target file.
    pub output: Option<String>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Text of the seed `user` message.
    pub fn render(&self) -> String {
        let mut text = self.text.clone();
        if let Some(mode) = &self.mode {
            text.push_str("\nMode: ");
            text.push_str(mode);
        }
        if let Some(output) = &self.output {
            text.push_str("\nOutput: ");
            text.push_str(output);
        }
        text
    }
}

impl From<&str> for Goal {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Goal {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The planner gave a final answer.
    Done,
    /// The step budget ran out first.
    Stopped,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Final answer, absent when the run stopped on the step budget.
    #[serde(rename = "final")]
    pub final_answer: Option<String>,

    /// Every message of the run, seed first.
    pub transcript: Vec<Message>,

    pub status: RunStatus,

    /// Planning calls made.
    pub steps: usize,

    pub run_id: String,
}

/// Loop state. Each variant carries exactly what its stage needs.
#[derive(Debug)]
pub(crate) enum LoopState {
    /// About to ask the planner for step `step` (1-based).
    Planning { step: usize },
    /// About to invoke the tool chosen at `step`.
    Acting {
        step: usize,
        server: String,
        tool: String,
        arguments: Value,
    },
    /// Tool call finished; fold the result into the transcript.
    Observing {
        step: usize,
        tool: String,
        result: Result<ToolOutput, McpError>,
    },
    Done { answer: String, steps: usize },
    Stopped { steps: usize },
}

/// Observer hooks for a run.
///
/// Uses `Arc` so the CLI can share one set of callbacks with a spinner.
#[derive(Clone, Default)]
pub struct OrchestratorCallbacks {
    /// Called after each planning call (step, decision).
    pub on_decision: Option<Arc<dyn Fn(usize, &PlanDecision) + Send + Sync>>,
    /// Called after each tool call (qualified tool, success, summary or error text).
    pub on_tool_result: Option<Arc<dyn Fn(&str, bool, &str) + Send + Sync>>,
}

impl std::fmt::Debug for OrchestratorCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorCallbacks")
            .field("on_decision", &self.on_decision.is_some())
            .field("on_tool_result", &self.on_tool_result.is_some())
            .finish()
    }
}

/// Per-run options for [`super::run_with_servers`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the configured step budget.
    pub max_steps: Option<usize>,

    pub callbacks: OrchestratorCallbacks,

    /// Setting the value to `true` cancels the run.
    pub cancel: Option<watch::Receiver<bool>>,
}
