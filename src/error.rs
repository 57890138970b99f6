// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for Conductor.
//!
//! Each layer gets its own `thiserror` enum. Tool-call failures live in
//! [`crate::mcp::McpError`]; this module covers the planner backends,
//! configuration, and whole runs. `anyhow` is only used at the binary edge.

use std::time::Duration;

use thiserror::Error;

use crate::mcp::McpError;
use crate::orchestrator::RunOutcome;

/// Errors that can occur while talking to an LLM backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Map a transport error, naming the client's configured `timeout` when it fired.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

/// Errors produced by a planner's `decide` call.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Planner backend error: {0}")]
    Provider(#[from] ProviderError),

    /// The backend answered, but not with a usable decision.
    #[error("Malformed planner decision: {reason}")]
    MalformedDecision { reason: String, raw: String },
}

impl PlannerError {
    /// Create a malformed decision error, keeping the raw text for diagnostics.
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedDecision {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Check if this is a malformed decision (as opposed to a transport failure).
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedDecision { .. })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that end a run.
///
/// Single tool-call failures never show up here: the loop feeds them back
/// into the transcript. Only lifecycle and decision failures propagate.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Hub(#[from] McpError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Run cancelled")]
    Cancelled,

    /// The run finished but at least one session failed to close.
    #[error("Run finished but shutdown failed: {source}")]
    Shutdown {
        outcome: Box<RunOutcome>,
        #[source]
        source: McpError,
    },
}

impl RunError {
    /// Check if this run failed because the planner produced an unusable decision.
    pub fn is_malformed_decision(&self) -> bool {
        matches!(self, Self::Planner(e) if e.is_malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_timeout_names_duration() {
        let err = ProviderError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Request timed out after 30000ms");
    }

    #[test]
    fn test_provider_error_api() {
        match ProviderError::api("Bad request", 400) {
            ProviderError::ApiError { message, status_code } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ConfigError::from(io_err), ConfigError::NotFound(_)));
    }

    #[test]
    fn test_malformed_decision_is_distinguishable() {
        let err: RunError = PlannerError::malformed("not valid JSON", "hello").into();
        assert!(err.is_malformed_decision());

        let err: RunError = PlannerError::from(ProviderError::NetworkError("down".into())).into();
        assert!(!err.is_malformed_decision());
    }

    #[test]
    fn test_run_error_display_is_transparent() {
        let err: RunError = McpError::UnknownServer("ghost".to_string()).into();
        assert!(err.to_string().contains("ghost"));
    }
}
