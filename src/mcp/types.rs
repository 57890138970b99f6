// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP types for tool and content handling.
//!
//! Tool servers return loosely shaped content lists. These types turn them
//! into a closed set of variants and then into the single canonical mapping
//! the planning loop observes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version sent in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A tool advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Server this tool belongs to.
    pub server: String,

    /// Tool name, unique within its server.
    pub name: String,

    /// Tool description.
    #[serde(default)]
    pub description: String,

    /// JSON Schema for tool input.
    #[serde(default)]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor from one entry of a `tools/list` result.
    ///
    /// Returns `None` when the entry has no name.
    pub fn from_wire(server: &str, tool: &Value) -> Option<Self> {
        let name = tool.get("name")?.as_str()?.to_string();
        Some(Self {
            server: server.to_string(),
            name,
            description: tool
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }

    /// Get the qualified tool name (`server.tool`).
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server, self.name)
    }

    /// One line of the tool catalog shown to the planner.
    pub fn spec_line(&self) -> String {
        format!("- {}: {}", self.qualified_name(), self.description)
    }
}

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    /// Plain text.
    Text(String),
    /// Image reference.
    Image { uri: String },
    /// List of resources, passed through as-is.
    Resources(Vec<Value>),
}

impl ToolContent {
    /// Classify one wire content item.
    ///
    /// Items without a recognizable `text`, image or resource payload yield
    /// `None` and are dropped.
    pub fn from_wire(item: &Value) -> Option<Self> {
        if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
            return Some(Self::Text(text.to_string()));
        }

        if let Some(resources) = item.get("resources").and_then(|r| r.as_array()) {
            return Some(Self::Resources(resources.clone()));
        }

        match item.get("type").and_then(|t| t.as_str()) {
            Some("image") => image_uri(item).map(|uri| Self::Image { uri }),
            Some("resource") => item
                .get("resource")
                .map(|r| Self::Resources(vec![r.clone()])),
            _ => item
                .get("image")
                .and_then(image_uri)
                .map(|uri| Self::Image { uri }),
        }
    }
}

fn image_uri(item: &Value) -> Option<String> {
    if let Some(uri) = item.get("uri").and_then(|u| u.as_str()) {
        return Some(uri.to_string());
    }
    if let Some(uri) = item
        .get("image")
        .and_then(|i| i.get("uri"))
        .and_then(|u| u.as_str())
    {
        return Some(uri.to_string());
    }
    let data = item.get("data")?.as_str()?;
    let mime = item
        .get("mimeType")
        .and_then(|m| m.as_str())
        .unwrap_or("application/octet-stream");
    Some(format!("data:{};base64,{}", mime, data))
}

/// Parsed result of a `tools/call` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallToolResult {
    /// Recognized content items, in wire order.
    pub content: Vec<ToolContent>,

    /// Whether the tool flagged the result as an error.
    pub is_error: bool,
}

impl CallToolResult {
    /// Parse the `result` object of a `tools/call` response.
    pub fn from_wire(result: &Value) -> Self {
        let content = result
            .get("content")
            .and_then(|c| c.as_array())
            .map(|items| items.iter().filter_map(ToolContent::from_wire).collect())
            .unwrap_or_default();

        Self {
            content,
            is_error: result
                .get("isError")
                .and_then(|e| e.as_bool())
                .unwrap_or(false),
        }
    }

    /// Create a successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: false,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(message.into())],
            is_error: true,
        }
    }

    /// Get the text content as a single string.
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Canonical tool output observed by the planning loop.
///
/// Serializes as a mapping with only the present keys; a result with no
/// recognizable content serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Value>>,
}

impl ToolOutput {
    /// Fold content items into the canonical mapping.
    ///
    /// Text items are joined with newlines, resource lists are concatenated,
    /// and the last image wins.
    pub fn normalize(content: &[ToolContent]) -> Self {
        let mut texts: Vec<&str> = Vec::new();
        let mut output = Self::default();

        for item in content {
            match item {
                ToolContent::Text(text) => texts.push(text),
                ToolContent::Image { uri } => output.image = Some(format!("Image: {}", uri)),
                ToolContent::Resources(list) => output
                    .resources
                    .get_or_insert_with(Vec::new)
                    .extend(list.iter().cloned()),
            }
        }

        if !texts.is_empty() {
            output.text = Some(texts.join("\n"));
        }
        output
    }

    /// Check whether nothing was recognized.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none() && self.resources.is_none()
    }

    /// Compact JSON rendering used for summaries and the run log.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<&CallToolResult> for ToolOutput {
    fn from(result: &CallToolResult) -> Self {
        Self::normalize(&result.content)
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// Check whether this response answers the request with `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.id.as_ref().and_then(|v| v.as_u64()) == Some(id)
    }
}

/// Server information reported during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,

    /// Server version.
    pub version: String,

    /// Protocol version the server agreed to.
    #[serde(default)]
    pub protocol_version: Option<String>,
}

impl ServerInfo {
    /// Extract server info from an `initialize` result.
    pub fn from_initialize(result: &Value) -> Self {
        let info = result.get("serverInfo");
        Self {
            name: info
                .and_then(|s| s.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            version: info
                .and_then(|s| s.get("version"))
                .and_then(|v| v.as_str())
                .unwrap_or("0.0.0")
                .to_string(),
            protocol_version: result
                .get("protocolVersion")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        }
    }
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "0.0.0".to_string(),
            protocol_version: None,
        }
    }
}
