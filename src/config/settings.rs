// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime settings read from the environment.
//!
//! | Variable              | Default                          |
//! |-----------------------|----------------------------------|
//! | `MAX_STEPS`           | 6                                |
//! | `MAX_RETRIES`         | 3                                |
//! | `RETRY_BACKOFF_MS`    | 1000                             |
//! | `TOOL_TIMEOUT_SEC`    | 120                              |
//! | `LOGS_DIR`            | `./logs`                         |
//! | `LLM_BACKEND`         | `groq` (`ollama` for local)      |
//! | `GROQ_API_KEY`        | none                             |
//! | `GROQ_MODEL`          | `llama-3.3-70b-versatile`        |
//! | `GROQ_BASE_URL`       | `https://api.groq.com/openai/v1` |
//! | `OLLAMA_MODEL`        | `llama3.1`                       |
//! | `OLLAMA_HOST`         | `http://localhost:11434`         |
//! | `REQUEST_TIMEOUT_SEC` | 90                               |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mcp::RetryPolicy;
use crate::planner::BackendType;

/// Strategy guidance appended to every planning prompt.
pub const DEFAULT_STRATEGY_HINT: &str = "\
Suggested strategy for a research brief:
- search for sources, then read the two or three most relevant ones
- enrich metadata (DOI, BibTeX) for what you read
- assemble the brief, then clean up its citations
- save the final Markdown with a file tool";

/// Planner backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub backend: BackendType,

    /// Model name; the backend default when `None`.
    pub model: Option<String>,

    /// Bearer key for the hosted backend.
    pub api_key: Option<String>,

    /// Base URL (hosted) or host (local); the backend default when `None`.
    pub base_url: Option<String>,

    /// HTTP request timeout.
    pub timeout: Duration,

    pub temperature: f32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            backend: BackendType::Groq,
            model: None,
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(90),
            temperature: 0.0,
        }
    }
}

impl PlannerSettings {
    /// Model to use, falling back to the backend default.
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.backend.default_model().to_string())
    }

    /// Base URL to use, falling back to the backend default.
    pub fn base_url_or_default(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.backend.default_base_url().to_string())
    }
}

/// Operational settings for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Planning calls per run before stopping.
    pub max_steps: usize,

    /// Attempts per tool call, including the first.
    pub max_retries: u32,

    /// Pause between tool call attempts.
    pub retry_backoff: Duration,

    /// Bound on each tool call.
    pub tool_timeout: Duration,

    /// Characters of tool output fed back to the planner.
    pub observation_chars: usize,

    /// Directory for run logs.
    pub logs_dir: PathBuf,

    /// Guidance appended to the planning prompt.
    pub strategy_hint: String,

    pub planner: PlannerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_steps: 6,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            tool_timeout: Duration::from_secs(120),
            observation_chars: 1500,
            logs_dir: PathBuf::from("./logs"),
            strategy_hint: DEFAULT_STRATEGY_HINT.to_string(),
            planner: PlannerSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, so tests need not touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(v) = get("MAX_STEPS") {
            settings.max_steps = parse_number("MAX_STEPS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            settings.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_BACKOFF_MS") {
            settings.retry_backoff = Duration::from_millis(parse_number("RETRY_BACKOFF_MS", &v)?);
        }
        if let Some(v) = get("TOOL_TIMEOUT_SEC") {
            settings.tool_timeout = Duration::from_secs(parse_number("TOOL_TIMEOUT_SEC", &v)?);
        }
        if let Some(v) = get("LOGS_DIR") {
            settings.logs_dir = PathBuf::from(v);
        }

        let planner = &mut settings.planner;
        if let Some(v) = get("LLM_BACKEND") {
            planner.backend = BackendType::from_str(&v).map_err(|_| ConfigError::InvalidValue {
                field: "LLM_BACKEND".to_string(),
                message: format!("unknown backend '{}', expected groq or ollama", v),
            })?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SEC") {
            planner.timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SEC", &v)?);
        }
        match planner.backend {
            BackendType::Groq => {
                planner.api_key = get("GROQ_API_KEY");
                planner.model = get("GROQ_MODEL");
                planner.base_url = get("GROQ_BASE_URL");
            }
            BackendType::Ollama => {
                planner.model = get("OLLAMA_MODEL");
                planner.base_url = get("OLLAMA_HOST");
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_STEPS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_RETRIES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.tool_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "TOOL_TIMEOUT_SEC".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Retry policy for the tool invoker.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("expected a non-negative integer, got '{}'", value),
    })
}
