// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for Conductor.
//!
//! Two sources:
//! - the server configuration file (JSON or YAML), naming each tool server
//!   and how to launch it
//! - environment variables (optionally from a `.env` file) for run knobs and
//!   planner backend selection, which CLI flags may override

mod loader;
mod servers;
mod settings;

pub use loader::{
    get_global_config_path, load_servers_file, resolve_config_path, CONFIG_ENV_VAR,
    DEFAULT_CONFIG_PATH, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};
pub use servers::{expand_placeholders, validate_server_name, ServerSpec, ServersConfig};
pub use settings::{PlannerSettings, Settings, DEFAULT_STRATEGY_HINT};
