// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end runs: config file → hub → planning loop → run log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use conductor::config::{load_servers_file, Settings};
use conductor::orchestrator::{run_with_servers, RunOptions, RunStatus};
use conductor::runlog::{RunLog, REDACTION};
use conductor::{Message, PlanDecision, Planner, PlannerError, RunError};

/// Replays decisions in order.
struct StubPlanner {
    decisions: Mutex<VecDeque<PlanDecision>>,
    calls: Arc<AtomicUsize>,
}

impl StubPlanner {
    fn new(decisions: Vec<PlanDecision>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let planner = Self {
            decisions: Mutex::new(decisions.into()),
            calls: calls.clone(),
        };
        (planner, calls)
    }
}

#[async_trait]
impl Planner for StubPlanner {
    async fn decide(
        &self,
        _system_prompt: &str,
        _transcript: &[Message],
        _schema: Option<&Value>,
    ) -> Result<PlanDecision, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PlannerError::malformed("no more decisions", ""))
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub"
    }
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("mcp_servers.json");
    let config = json!({
        "demo": {"command": env!("CARGO_BIN_EXE_echo-tool"), "args": []}
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

#[tokio::test]
async fn test_demo_list_scenario() {
    let dir = TempDir::new().unwrap();
    let servers = load_servers_file(write_config(&dir)).unwrap();
    let log = Arc::new(RunLog::create(dir.path().join("logs")).unwrap());
    let log_path = log.path().to_path_buf();

    let (planner, calls) = StubPlanner::new(vec![
        PlanDecision::call_tool("demo", "list", json!({})),
        PlanDecision::final_answer("done"),
    ]);

    let outcome = run_with_servers(
        &Settings::default(),
        servers.servers,
        Box::new(planner),
        log,
        "list files",
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.final_answer.as_deref(), Some("done"));
    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.transcript.len(), 4);
    assert_eq!(outcome.transcript[0], Message::user("list files"));
    assert_eq!(outcome.transcript[1], Message::assistant("TOOL demo.list OK"));
    assert!(outcome.transcript[2].content.contains("alpha\\nbeta\\ngamma"));
    assert_eq!(outcome.transcript[3], Message::assistant("done"));

    let records = RunLog::read_records(&log_path).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].kind, "tool_call");
    assert_eq!(records[0].server, "demo");
    assert_eq!(records[0].tool, "list");
}

#[tokio::test]
async fn test_failures_are_fed_back_and_secrets_redacted() {
    let dir = TempDir::new().unwrap();
    let servers = load_servers_file(write_config(&dir)).unwrap();
    let log = Arc::new(RunLog::create(dir.path()).unwrap());
    let log_path = log.path().to_path_buf();

    let (planner, _) = StubPlanner::new(vec![
        PlanDecision::call_tool("demo", "fail", json!({"api_key": "sk-live-123", "query": "x"})),
        PlanDecision::call_tool("demo", "echo", json!({"text": "hi", "Token": "abc"})),
        PlanDecision::final_answer("recovered"),
    ]);

    let outcome = run_with_servers(
        &Settings::default(),
        servers.servers,
        Box::new(planner),
        log,
        "try things",
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.final_answer.as_deref(), Some("recovered"));
    assert!(outcome.transcript[1].content.starts_with("Error demo.fail: "));
    assert_eq!(outcome.transcript[2], Message::assistant("TOOL demo.echo OK"));

    let records = RunLog::read_records(&log_path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert_eq!(records[0].args["api_key"], REDACTION);
    assert_eq!(records[0].args["query"], "x");
    assert_eq!(records[1].args["Token"], REDACTION);

    let raw = std::fs::read_to_string(&log_path).unwrap();
    assert!(!raw.contains("sk-live-123"));
    assert!(!raw.contains("\"abc\""));
}

#[tokio::test]
async fn test_step_ceiling_with_live_server() {
    let dir = TempDir::new().unwrap();
    let servers = load_servers_file(write_config(&dir)).unwrap();
    let decisions = vec![PlanDecision::call_tool("demo", "list", json!({})); 5];
    let (planner, calls) = StubPlanner::new(decisions);

    let outcome = run_with_servers(
        &Settings::default(),
        servers.servers,
        Box::new(planner),
        Arc::new(RunLog::create(dir.path()).unwrap()),
        "never finish",
        RunOptions {
            max_steps: Some(3),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.final_answer, None);
    assert_eq!(outcome.status, RunStatus::Stopped);
    assert_eq!(outcome.transcript.len(), 7);
}

#[tokio::test]
async fn test_malformed_decision_ends_run() {
    let dir = TempDir::new().unwrap();
    let servers = load_servers_file(write_config(&dir)).unwrap();
    let (planner, _) = StubPlanner::new(Vec::new());

    let err = run_with_servers(
        &Settings::default(),
        servers.servers,
        Box::new(planner),
        Arc::new(RunLog::create(dir.path()).unwrap()),
        "x",
        RunOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(err.is_malformed_decision());
    assert!(matches!(err, RunError::Planner(_)));
}
