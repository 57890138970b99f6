// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model Context Protocol (MCP) client side.
//!
//! Each configured tool server runs as a child process speaking
//! line-delimited JSON-RPC over stdio. The [`Hub`] owns one [`Session`] per
//! server; the [`ToolInvoker`] turns a qualified `server.tool` name into a
//! bounded, retried, logged call.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                     ToolInvoker                        │
//! │      split "server.tool" · retry · normalize · log     │
//! └───────────────────────────┬───────────────────────────┘
//!                             │ ToolBackend
//! ┌───────────────────────────▼───────────────────────────┐
//! │                         Hub                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐    │
//! │  │  Session    │  │  Session    │  │  Session    │    │
//! │  │  (web)      │  │  (papers)   │  │  (notes)    │    │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘    │
//! └─────────┼────────────────┼────────────────┼───────────┘
//!     ┌─────▼─────┐    ┌─────▼─────┐    ┌─────▼─────┐
//!     │  Stdio    │    │  Stdio    │    │  Stdio    │
//!     │ Transport │    │ Transport │    │ Transport │
//!     └───────────┘    └───────────┘    └───────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conductor::config::load_servers_file;
//! use conductor::mcp::{Hub, ToolInvoker};
//! use conductor::runlog::MemoryLog;
//!
//! let config = load_servers_file("config/mcp_servers.json")?;
//! let mut hub = Hub::new(config.servers);
//! hub.start().await?;
//! println!("{}", hub.available_tools_spec());
//!
//! let hub = Arc::new(hub);
//! let invoker = ToolInvoker::new(hub.clone(), Arc::new(MemoryLog::new()));
//! let output = invoker.execute("web.search", serde_json::json!({"q": "rust"})).await?;
//!
//! hub.stop().await?;
//! ```

pub mod error;
pub mod hub;
pub mod invoker;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use hub::{Hub, ToolBackend, DEFAULT_TOOL_TIMEOUT};
pub use invoker::{split_qualified, RetryPolicy, ToolInvoker};
pub use registry::ToolRegistry;
pub use session::Session;
pub use types::{CallToolResult, ToolContent, ToolDescriptor, ToolOutput};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = std::any::type_name::<Hub>();
        let _ = std::any::type_name::<McpError>();
        let _ = std::any::type_name::<ToolInvoker>();
    }
}
