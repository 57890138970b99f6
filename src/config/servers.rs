// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool server configuration.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "web": {
//!     "command": "python",
//!     "args": ["-m", "servers.web", "--key", "${SEARCH_API_KEY}"],
//!     "env": {"PYTHONUNBUFFERED": "1"}
//!   },
//!   "papers": {
//!     "command": "node",
//!     "args": ["papers/index.js"],
//!     "startup_timeout_sec": 60
//!   }
//! }
//! ```
//!
//! The same mapping may also be wrapped under an `mcp_servers` or `servers`
//! key. Server order in the file is the start order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Keys under which the server mapping may be nested.
const WRAPPER_KEYS: &[&str] = &["mcp_servers", "servers"];

fn default_enabled() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

/// How to launch one tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Server name, taken from the mapping key.
    #[serde(skip)]
    pub name: String,

    /// Executable to run.
    pub command: String,

    /// Arguments, with `$VAR`/`${VAR}` placeholders already expanded.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlay for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the child process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Disabled servers are skipped by `Hub::start`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Bound on spawn, handshake and tool discovery.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,
}

impl ServerSpec {
    /// Create a stdio server spec with no arguments.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            enabled: true,
            startup_timeout_sec: default_startup_timeout(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Check that `name` can qualify tool names as `server.tool`.
///
/// Tool names are split on the first `.`, so a dotted server name would be
/// listed but never routable.
pub fn validate_server_name(name: &str) -> Result<(), ConfigError> {
    let message = if name.trim().is_empty() {
        "must not be empty".to_string()
    } else if name.contains('.') {
        format!("'{}' must not contain '.'", name)
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidValue {
        field: "server name".to_string(),
        message,
    })
}

/// Expand `$VAR` and `${VAR}` using `lookup`. Unknown variables stay as written.
pub fn expand_placeholders<F>(input: &str, lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    shellexpand::env_with_context_no_errors(input, lookup).into_owned()
}

/// All configured servers, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServersConfig {
    pub servers: Vec<ServerSpec>,
}

impl ServersConfig {
    /// Parse configuration from a JSON string, expanding from the process environment.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value, |var| std::env::var(var).ok())
    }

    /// Build from an already parsed document.
    pub fn from_value<F>(value: Value, mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mapping = unwrap_mapping(value)?;

        let mut servers = Vec::with_capacity(mapping.len());
        for (name, entry) in mapping {
            validate_server_name(&name)?;
            let mut spec: ServerSpec =
                serde_json::from_value(entry).map_err(|e| ConfigError::InvalidValue {
                    field: name.clone(),
                    message: e.to_string(),
                })?;
            if spec.command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.command", name),
                    message: "must not be empty".to_string(),
                });
            }
            spec.command = expand_placeholders(&spec.command, &mut lookup);
            spec.args = spec
                .args
                .iter()
                .map(|arg| expand_placeholders(arg, &mut lookup))
                .collect();
            for value in spec.env.values_mut() {
                *value = expand_placeholders(value, &mut lookup);
            }
            if let Some(cwd) = spec.cwd.take() {
                spec.cwd = Some(PathBuf::from(expand_placeholders(&cwd.to_string_lossy(), &mut lookup)));
            }
            spec.name = name;
            servers.push(spec);
        }

        Ok(Self { servers })
    }

    /// Servers that `Hub::start` will launch.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerSpec> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Look up a server by name.
    pub fn get(&self, name: &str) -> Option<&ServerSpec> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Strip a single wrapper key, if the document uses one.
///
/// A wrapper key is only honored when its value is not itself a server entry,
/// so a server literally named `servers` still works.
fn unwrap_mapping(value: Value) -> Result<serde_json::Map<String, Value>, ConfigError> {
    let Value::Object(mut root) = value else {
        return Err(ConfigError::InvalidFormat(
            "server configuration must be a mapping of name to server".to_string(),
        ));
    };

    for key in WRAPPER_KEYS {
        let is_wrapper = matches!(
            root.get(*key),
            Some(Value::Object(inner)) if !inner.contains_key("command")
        );
        if is_wrapper && root.len() == 1 {
            if let Some(Value::Object(inner)) = root.remove(*key) {
                return Ok(inner);
            }
        }
    }
    Ok(root)
}
