// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Planner decisions and their JSON wire shape.
//!
//! The model is asked to answer with:
//!
//! ```json
//! {"decision": "call_tool", "action": {"server": "web", "tool": "search", "args": {"q": "..."}}}
//! {"decision": "final_answer", "notes": "..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::PlannerError;

/// Final answer text used when the model omits `notes`.
pub const EMPTY_ANSWER: &str = "(no content)";

/// What the planner wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanDecision {
    /// Invoke one tool.
    CallTool {
        server: String,
        tool: String,
        arguments: Value,
    },
    /// Stop and answer.
    FinalAnswer { text: String },
}

impl PlanDecision {
    /// Create a tool call decision.
    pub fn call_tool(server: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        Self::CallTool {
            server: server.into(),
            tool: tool.into(),
            arguments,
        }
    }

    /// Create a final answer decision.
    pub fn final_answer(text: impl Into<String>) -> Self {
        Self::FinalAnswer { text: text.into() }
    }

    /// `server.tool` for a tool call.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Self::CallTool { server, tool, .. } => Some(format!("{}.{}", server, tool)),
            Self::FinalAnswer { .. } => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. })
    }
}

/// JSON Schema the backends are asked to constrain output to.
pub fn planner_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {"type": "string", "enum": ["call_tool", "final_answer"]},
            "action": {
                "type": "object",
                "properties": {
                    "server": {"type": "string"},
                    "tool": {"type": "string"},
                    "args": {"type": "object"}
                },
                "required": ["server", "tool", "args"]
            },
            "notes": {"type": "string"}
        },
        "required": ["decision"]
    })
}

/// Parse raw model output into a decision.
///
/// Accepts the JSON object alone, wrapped in a fenced code block, or
/// surrounded by stray prose. A tool given as `server.tool` with no separate
/// `server` is split on the first dot.
pub fn parse_decision(raw: &str) -> Result<PlanDecision, PlannerError> {
    let value = extract_json(raw)
        .ok_or_else(|| PlannerError::malformed("response is not a JSON object", raw))?;
    decision_from_value(&value).map_err(|reason| PlannerError::malformed(reason, raw))
}

fn extract_json(raw: &str) -> Option<Value> {
    let text = strip_fence(raw.trim());
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn decision_from_value(value: &Value) -> Result<PlanDecision, String> {
    let decision = value
        .get("decision")
        .and_then(|d| d.as_str())
        .ok_or_else(|| "missing 'decision'".to_string())?;

    match decision {
        "final_answer" => {
            let text = match value.get("notes") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => EMPTY_ANSWER.to_string(),
                Some(other) => other.to_string(),
            };
            Ok(PlanDecision::FinalAnswer { text })
        }
        "call_tool" => {
            let action = value
                .get("action")
                .and_then(|a| a.as_object())
                .ok_or_else(|| "call_tool without an 'action' object".to_string())?;
            let (server, tool) = action_target(action)?;

            let arguments = match action.get("args").or_else(|| action.get("arguments")) {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(args @ Value::Object(_)) => args.clone(),
                Some(_) => return Err("'action.args' must be an object".to_string()),
            };
            Ok(PlanDecision::CallTool {
                server,
                tool,
                arguments,
            })
        }
        other => Err(format!("unknown decision '{}'", other)),
    }
}

fn action_target(action: &Map<String, Value>) -> Result<(String, String), String> {
    let non_empty = |key: &str| {
        action
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let tool = non_empty("tool").ok_or_else(|| "call_tool without 'action.tool'".to_string())?;
    match non_empty("server") {
        Some(server) => {
            // Some models repeat the server inside the tool name.
            let tool = tool
                .strip_prefix(server)
                .and_then(|t| t.strip_prefix('.'))
                .filter(|t| !t.is_empty())
                .unwrap_or(tool);
            Ok((server.to_string(), tool.to_string()))
        }
        None => match tool.split_once('.') {
            Some((server, tool)) if !server.is_empty() && !tool.is_empty() => {
                Ok((server.to_string(), tool.to_string()))
            }
            _ => Err("call_tool without 'action.server'".to_string()),
        },
    }
}
