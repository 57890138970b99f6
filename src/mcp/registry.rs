// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registry of tools discovered across servers.
//!
//! Tools are kept in registration order so the catalog shown to the planner
//! is stable: servers in configuration order, tools in the order each server
//! listed them.

use std::collections::HashMap;

use tracing::warn;

use super::types::ToolDescriptor;

/// Tools keyed by `(server, tool)`.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<(String, String), usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second tool with the same `(server, tool)` key is
    /// ignored and `false` is returned.
    pub fn register(&mut self, tool: ToolDescriptor) -> bool {
        let key = (tool.server.clone(), tool.name.clone());
        if self.index.contains_key(&key) {
            warn!(tool = %tool.qualified_name(), "Duplicate tool advertised, keeping the first");
            return false;
        }
        self.index.insert(key, self.tools.len());
        self.tools.push(tool);
        true
    }

    /// Register every tool a server advertised.
    pub fn register_all(&mut self, tools: impl IntoIterator<Item = ToolDescriptor>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Look up a tool.
    pub fn get(&self, server: &str, tool: &str) -> Option<&ToolDescriptor> {
        self.index
            .get(&(server.to_string(), tool.to_string()))
            .map(|&i| &self.tools[i])
    }

    /// Iterate tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render catalog lines for tools whose server passes `include`.
    pub fn render_filtered(&self, include: impl Fn(&str) -> bool) -> String {
        self.tools
            .iter()
            .filter(|t| include(&t.server))
            .map(ToolDescriptor::spec_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the full catalog, one `- server.tool: description` per line.
    pub fn render(&self) -> String {
        self.render_filtered(|_| true)
    }
}
