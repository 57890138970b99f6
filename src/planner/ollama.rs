// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local planner over Ollama's native `/api/chat` endpoint.
//!
//! Ollama accepts a JSON Schema directly in `format`, which constrains the
//! reply to the decision shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::decision::{parse_decision, PlanDecision};
use super::{chat_messages, handle_error_response, Planner};
use crate::error::{PlannerError, ProviderError};
use crate::types::Message;

/// Default Ollama host.
pub const OLLAMA_HOST: &str = "http://localhost:11434";

/// Ollama planner.
#[derive(Debug, Clone)]
pub struct OllamaPlanner {
    client: Client,
    timeout: Duration,
    model: String,
    host: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaPlanner {
    /// Create a planner for `model` on `host`.
    pub fn new(model: impl Into<String>, host: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            model: model.into(),
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    fn build_request(&self, system_prompt: &str, transcript: &[Message], schema: Option<&Value>) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, transcript),
            "stream": false,
            "options": {"temperature": 0},
        });
        if let Some(schema) = schema {
            request["format"] = schema.clone();
        }
        request
    }
}

#[async_trait]
impl Planner for OllamaPlanner {
    async fn decide(
        &self,
        system_prompt: &str,
        transcript: &[Message],
        schema: Option<&Value>,
    ) -> Result<PlanDecision, PlannerError> {
        let request = self.build_request(system_prompt, transcript, schema);
        debug!(model = %self.model, host = %self.host, "Sending planner request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
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

        parse_decision(&body.message.content)
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn planner(host: &str) -> OllamaPlanner {
        OllamaPlanner::new("llama3.1", host, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_request() {
        let schema = json!({"type": "object"});
        let request = planner(OLLAMA_HOST).build_request("sys", &[Message::user("goal")], Some(&schema));
        assert_eq!(request["stream"], false);
        assert_eq!(request["format"], schema);
        assert_eq!(request["messages"][0]["content"], "sys");

        let request = planner(OLLAMA_HOST).build_request("sys", &[], None);
        assert!(request.get("format").is_none());
    }

    #[test]
    fn test_host_trailing_slash() {
        assert_eq!(planner("http://box:11434/").host, "http://box:11434");
    }

    #[tokio::test]
    async fn test_decide_final_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "llama3.1", "stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "model": "llama3.1",
                    "message": {"role": "assistant", "content": "{\"decision\":\"final_answer\",\"notes\":\"42\"}"},
                    "done": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let decision = planner(&server.url())
            .decide("sys", &[Message::user("answer")], None)
            .await
            .unwrap();
        assert_eq!(decision, PlanDecision::final_answer("42"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_decide_model_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model \"llama3.1\" not found, try pulling it first"}"#)
            .create_async()
            .await;

        let err = planner(&server.url()).decide("sys", &[], None).await.unwrap_err();
        assert!(matches!(err, PlannerError::Provider(ProviderError::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_decide_timeout_reports_configured_duration() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let planner = OllamaPlanner::new("llama3.1", host, Duration::from_millis(200)).unwrap();

        let err = planner.decide("sys", &[], None).await.unwrap_err();
        match err {
            PlannerError::Provider(ProviderError::Timeout(timeout)) => {
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        drop(listener);
    }

    #[tokio::test]
    async fn test_decide_unreachable_host() {
        // Port 9 (discard) is closed on test machines.
        let err = planner("http://127.0.0.1:9").decide("sys", &[], None).await.unwrap_err();
        assert!(matches!(err, PlannerError::Provider(_)));
        assert!(!err.is_malformed());
    }
}
