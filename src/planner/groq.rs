// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hosted planner over the Groq (OpenAI-compatible) chat completions API.
//!
//! When a schema is given the request asks for structured output
//! (`response_format.type = json_schema`); otherwise plain JSON mode.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::decision::{parse_decision, PlanDecision};
use super::{chat_messages, handle_error_response, Planner};
use crate::error::{PlannerError, ProviderError};
use crate::types::Message;

/// Default Groq API base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq planner.
#[derive(Debug, Clone)]
pub struct GroqPlanner {
    client: Client,
    timeout: Duration,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqPlanner {
    /// Create a new Groq planner.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        temperature: f32,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature,
        })
    }

    fn build_request(&self, system_prompt: &str, transcript: &[Message], schema: Option<&Value>) -> Value {
        let response_format = match schema {
            Some(schema) => json!({
                "type": "json_schema",
                "json_schema": {"name": "planner", "schema": schema}
            }),
            None => json!({"type": "json_object"}),
        };

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": response_format,
            "messages": chat_messages(system_prompt, transcript),
        })
    }
}

#[async_trait]
impl Planner for GroqPlanner {
    async fn decide(
        &self,
        system_prompt: &str,
        transcript: &[Message],
        schema: Option<&Value>,
    ) -> Result<PlanDecision, PlannerError> {
        let request = self.build_request(system_prompt, transcript, schema);
        let start = Instant::now();
        debug!(model = %self.model, messages = transcript.len(), "Sending planner request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text).into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        debug!(elapsed = ?start.elapsed(), "Planner responded");

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PlannerError::malformed("response has no message content", ""))?;

        parse_decision(&content)
    }

    fn name(&self) -> &str {
        "Groq"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
