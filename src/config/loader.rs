// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::servers::ServersConfig;
use crate::error::ConfigError;

/// Environment variable naming the server configuration file.
pub const CONFIG_ENV_VAR: &str = "MCP_SERVERS_CONFIG";

/// Server configuration path relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/mcp_servers.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".conductor";

/// Global server configuration file name.
pub const GLOBAL_CONFIG_FILE: &str = "mcp_servers.json";

/// Get the global server configuration path (`~/.conductor/mcp_servers.json`).
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Pick the server configuration file.
///
/// Order: explicit path, then `MCP_SERVERS_CONFIG`, then
/// `config/mcp_servers.json` under `cwd`, then the global file if it exists.
/// When nothing exists the project default is returned so the error names it.
pub fn resolve_config_path(explicit: Option<&Path>, env_value: Option<String>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env_value.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(path);
    }

    let project = cwd.join(DEFAULT_CONFIG_PATH);
    if project.exists() {
        return project;
    }
    match get_global_config_path() {
        Some(global) if global.exists() => global,
        _ => project,
    }
}

/// Load a server configuration file (JSON, or YAML by extension).
pub fn load_servers_file(path: impl AsRef<Path>) -> Result<ServersConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let value: Value = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    let config = ServersConfig::from_value(value, |var| std::env::var(var).ok())?;
    debug!(path = %path.display(), servers = config.len(), "Loaded server configuration");
    Ok(config)
}
