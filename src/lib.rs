// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor - multi-server MCP tool orchestration.
//!
//! Conductor starts one or more out-of-process MCP tool servers, discovers
//! the tools they advertise, and drives a plan → act → observe loop in which
//! a language model picks the next tool call from the accumulated results
//! until it produces a final answer or the step budget runs out.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Transcript message types
//! - [`error`] - Error types for configuration, planning, and runs
//! - [`config`] - Server configuration files and runtime settings
//! - [`mcp`] - Sessions, the server hub, and the retrying tool invoker
//! - [`planner`] - Planner trait with hosted (Groq) and local (Ollama) backends
//! - [`runlog`] - Append-only JSON-lines record of every tool call attempt
//! - [`orchestrator`] - The planning loop and scoped server lifecycle
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conductor::config::{load_servers_file, Settings};
//! use conductor::orchestrator::{run_with_servers, Goal};
//! use conductor::planner::create_planner;
//! use conductor::runlog::RunLog;
//!
//! let settings = Settings::from_env()?;
//! let servers = load_servers_file("config/mcp_servers.json")?;
//! let planner = create_planner(&settings.planner)?;
//! let log = Arc::new(RunLog::create(&settings.logs_dir)?);
//!
//! let outcome = run_with_servers(
//!     &settings,
//!     servers.servers,
//!     planner,
//!     log,
//!     Goal::new("Summarize recent work on retrieval for code search"),
//!     Default::default(),
//! )
//! .await?;
//! println!("{:?}", outcome.final_answer);
//! ```

pub mod config;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod planner;
pub mod runlog;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConfigError, PlannerError, ProviderError, RunError};
pub use mcp::{Hub, McpError, ToolBackend, ToolInvoker, ToolOutput};
pub use orchestrator::{Goal, Orchestrator, RunOutcome, RunStatus};
pub use planner::{PlanDecision, Planner};
pub use types::{Message, Role};

/// Conductor version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
