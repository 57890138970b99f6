// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Planner backends.
//!
//! A [`Planner`] turns `(system prompt, transcript, schema)` into the next
//! [`PlanDecision`]. It keeps no state between calls. Two backends are
//! provided:
//!
//! - [`groq::GroqPlanner`] - hosted, OpenAI-compatible chat completions
//! - [`ollama::OllamaPlanner`] - local Ollama `/api/chat`
//!
//! # Quick Start
//!
//! ```bash
//! # Hosted
//! export GROQ_API_KEY=your-key
//!
//! # Local
//! export LLM_BACKEND=ollama
//! ```
//!
//! ```rust,ignore
//! use conductor::config::Settings;
//! use conductor::planner::create_planner;
//!
//! let settings = Settings::from_env()?;
//! let planner = create_planner(&settings.planner)?;
//! ```

pub mod decision;
pub mod groq;
pub mod ollama;

pub use decision::{parse_decision, planner_schema, PlanDecision, EMPTY_ANSWER};
pub use groq::GroqPlanner;
pub use ollama::OllamaPlanner;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::PlannerSettings;
use crate::error::{PlannerError, ProviderError};
use crate::types::Message;

/// Chooses the next step of a run.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Decide the next step.
    ///
    /// `schema`, when given, is passed to the backend to constrain its output.
    async fn decide(
        &self,
        system_prompt: &str,
        transcript: &[Message],
        schema: Option<&Value>,
    ) -> Result<PlanDecision, PlannerError>;

    /// Backend name for display.
    fn name(&self) -> &str;

    /// Model in use.
    fn model(&self) -> &str;
}

/// A boxed planner instance ready for use.
pub type BoxedPlanner = Box<dyn Planner>;

/// Supported planner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Groq hosted API (OpenAI-compatible).
    Groq,
    /// Local Ollama server.
    Ollama,
}

impl BackendType {
    /// Get the default model for this backend.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Ollama => "llama3.1",
        }
    }

    /// Get the default base URL for this backend.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => groq::GROQ_BASE_URL,
            Self::Ollama => ollama::OLLAMA_HOST,
        }
    }

    /// Check if this backend requires an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Groq)
    }
}

/// Error type for parsing a backend type from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseBackendTypeError;

impl std::fmt::Display for ParseBackendTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid backend type")
    }
}

impl std::error::Error for ParseBackendTypeError {}

impl std::str::FromStr for BackendType {
    type Err = ParseBackendTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "ollama" | "local" => Ok(Self::Ollama),
            _ => Err(ParseBackendTypeError),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groq => write!(f, "Groq"),
            Self::Ollama => write!(f, "Ollama"),
        }
    }
}

/// Create a planner from settings.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] when the hosted backend has no
/// API key.
pub fn create_planner(settings: &PlannerSettings) -> Result<BoxedPlanner, ProviderError> {
    let model = settings.model_or_default();
    let base_url = settings.base_url_or_default();

    match settings.backend {
        BackendType::Groq => {
            let api_key = settings
                .api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("GROQ_API_KEY is required for the groq backend".to_string()))?;
            Ok(Box::new(GroqPlanner::new(
                api_key,
                model,
                base_url,
                settings.timeout,
                settings.temperature,
            )?))
        }
        BackendType::Ollama => Ok(Box::new(OllamaPlanner::new(model, base_url, settings.timeout)?)),
    }
}

/// System message followed by the transcript, in chat wire shape.
pub(crate) fn chat_messages(system_prompt: &str, transcript: &[Message]) -> Vec<Value> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(json!({"role": "system", "content": system_prompt}));
    messages.extend(
        transcript
            .iter()
            .map(|m| json!({"role": m.role.to_string(), "content": m.content})),
    );
    messages
}

/// Map a non-success HTTP response to a provider error.
///
/// Both backends report errors as `{"error": {"message", "type"?}}` or
/// `{"error": "message"}`; anything else keeps the raw body.
pub(crate) fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let error_type = error
        .and_then(|e| e.get("type").or_else(|| e.get("code")))
        .and_then(|t| t.as_str());

    match (status_code, error_type) {
        (401 | 403, _) | (_, Some("authentication_error" | "invalid_api_key")) => {
            ProviderError::AuthError(message)
        }
        (429, _) | (_, Some("rate_limit_exceeded" | "rate_limit_error")) => {
            ProviderError::RateLimited(message)
        }
        (404, _) | (_, Some("model_not_found")) => ProviderError::ModelNotFound(message),
        _ => ProviderError::api(message, status_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(BackendType::from_str("groq").unwrap(), BackendType::Groq);
        assert_eq!(BackendType::from_str(" OLLAMA ").unwrap(), BackendType::Ollama);
        assert!(BackendType::from_str("gpt").is_err());
    }

    #[test]
    fn test_backend_defaults() {
        assert_eq!(BackendType::Groq.default_base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(BackendType::Ollama.default_base_url(), "http://localhost:11434");
        assert!(BackendType::Groq.requires_api_key());
        assert!(!BackendType::Ollama.requires_api_key());
        assert_eq!(BackendType::Ollama.to_string(), "Ollama");
    }

    #[test]
    fn test_create_planner_requires_key_for_groq() {
        let settings = PlannerSettings::default();
        let err = create_planner(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn test_create_planner_backends() {
        let settings = PlannerSettings {
            api_key: Some("gsk-test".to_string()),
            ..Default::default()
        };
        let planner = create_planner(&settings).unwrap();
        assert_eq!(planner.name(), "Groq");
        assert_eq!(planner.model(), "llama-3.3-70b-versatile");

        let settings = PlannerSettings {
            backend: BackendType::Ollama,
            model: Some("qwen2.5".to_string()),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let planner = create_planner(&settings).unwrap();
        assert_eq!(planner.name(), "Ollama");
        assert_eq!(planner.model(), "qwen2.5");
    }

    #[test]
    fn test_chat_messages_prepends_system() {
        let messages = chat_messages("sys", &[Message::user("goal"), Message::assistant("TOOL a.b OK")]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "goal");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_handle_error_response() {
        assert!(matches!(
            handle_error_response(401, r#"{"error": {"message": "Invalid API Key", "type": "invalid_request_error"}}"#),
            ProviderError::AuthError(m) if m == "Invalid API Key"
        ));
        assert!(matches!(
            handle_error_response(429, r#"{"error": {"message": "slow down"}}"#),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            handle_error_response(404, r#"{"error": "model 'x' not found"}"#),
            ProviderError::ModelNotFound(m) if m.contains("not found")
        ));
        match handle_error_response(500, "upstream exploded") {
            ProviderError::ApiError { message, status_code } => {
                assert_eq!(message, "upstream exploded");
                assert_eq!(status_code, Some(500));
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
