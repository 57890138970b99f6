// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The plan → act → observe loop.
//!
//! Each step asks the planner for a decision given the live tool catalog and
//! the transcript so far. A tool call is executed through the
//! [`ToolInvoker`] and its result (or error) is appended to the transcript.
//! The run ends on a final answer or when the step budget is spent.
//!
//! Tool failures never end a run; the planner sees them and adapts. Planner
//! failures (transport errors, malformed decisions) do.

mod types;

pub use types::{Goal, OrchestratorCallbacks, OrchestratorConfig, RunOptions, RunOutcome, RunStatus};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::{ServerSpec, Settings};
use crate::error::RunError;
use crate::mcp::{Hub, ToolInvoker};
use crate::planner::{planner_schema, BoxedPlanner, PlanDecision};
use crate::runlog::LogSink;
use crate::types::Message;
use types::LoopState;

/// Drives runs against one set of connected servers.
pub struct Orchestrator {
    invoker: ToolInvoker,
    planner: BoxedPlanner,
    config: OrchestratorConfig,
    callbacks: OrchestratorCallbacks,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("invoker", &self.invoker)
            .field("planner", &self.planner.name())
            .field("model", &self.planner.model())
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(invoker: ToolInvoker, planner: BoxedPlanner, config: OrchestratorConfig) -> Self {
        Self {
            invoker,
            planner,
            config,
            callbacks: OrchestratorCallbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: OrchestratorCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// System prompt for the next planning call, built from live tools.
    pub fn system_prompt(&self) -> String {
        format!(
            "You have access to the following MCP tools:\n{}\n\
             Decide the next tool call or give the final answer. Reply STRICTLY in JSON.\n{}",
            self.invoker.backend().tools_spec(),
            self.config.strategy_hint
        )
    }

    /// Run a goal to completion.
    ///
    /// `max_steps` overrides the configured budget for this run.
    pub async fn run_goal(&self, goal: impl Into<Goal>, max_steps: Option<usize>) -> Result<RunOutcome, RunError> {
        self.run(goal.into(), max_steps, None).await
    }

    /// Run a goal, aborting with [`RunError::Cancelled`] once `cancel_rx` turns `true`.
    pub async fn run_goal_with_cancel(
        &self,
        goal: impl Into<Goal>,
        max_steps: Option<usize>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<RunOutcome, RunError> {
        self.run(goal.into(), max_steps, Some(cancel_rx)).await
    }

    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    async fn run(
        &self,
        goal: Goal,
        max_steps: Option<usize>,
        mut cancel_rx: Option<watch::Receiver<bool>>,
    ) -> Result<RunOutcome, RunError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let max_steps = max_steps.unwrap_or(self.config.max_steps).max(1);
        let schema = planner_schema();
        let mut transcript = vec![Message::user(goal.render())];
        info!(max_steps, planner = self.planner.name(), "Starting run");

        let mut state = LoopState::Planning { step: 1 };
        loop {
            state = match state {
                LoopState::Planning { step } if step > max_steps => LoopState::Stopped { steps: max_steps },
                LoopState::Planning { step } => {
                    let system = self.system_prompt();
                    let decision = until_cancelled(
                        self.planner.decide(&system, &transcript, Some(&schema)),
                        &mut cancel_rx,
                    )
                    .await??;
                    debug!(step, ?decision, "Planner decided");
                    if let Some(ref on_decision) = self.callbacks.on_decision {
                        on_decision(step, &decision);
                    }

                    match decision {
                        PlanDecision::FinalAnswer { text } => LoopState::Done { answer: text, steps: step },
                        PlanDecision::CallTool {
                            server,
                            tool,
                            arguments,
                        } => LoopState::Acting {
                            step,
                            server,
                            tool,
                            arguments,
                        },
                    }
                }
                LoopState::Acting {
                    step,
                    server,
                    tool,
                    arguments,
                } => {
                    let qualified = format!("{}.{}", server, tool);
                    let result = until_cancelled(self.invoker.execute(&qualified, arguments), &mut cancel_rx).await?;
                    LoopState::Observing {
                        step,
                        tool: qualified,
                        result,
                    }
                }
                LoopState::Observing { step, tool, result } => {
                    match result {
                        Ok(output) => {
                            let json = output.to_json_string();
                            let snippet = truncate_str(&json, self.config.observation_chars);
                            transcript.push(Message::assistant(format!("TOOL {} OK", tool)));
                            transcript.push(Message::user(format!("Tool result (summary): {}", snippet)));
                            if let Some(ref on_tool_result) = self.callbacks.on_tool_result {
                                on_tool_result(&tool, true, snippet);
                            }
                        }
                        Err(e) => {
                            warn!(step, tool = %tool, error = %e, "Tool call failed, continuing");
                            let text = e.to_string();
                            transcript.push(Message::assistant(format!("Error {}: {}", tool, text)));
                            if let Some(ref on_tool_result) = self.callbacks.on_tool_result {
                                on_tool_result(&tool, false, &text);
                            }
                        }
                    }
                    LoopState::Planning { step: step + 1 }
                }
                LoopState::Done { answer, steps } => {
                    info!(steps, "Run finished with a final answer");
                    transcript.push(Message::assistant(answer.clone()));
                    return Ok(RunOutcome {
                        final_answer: Some(answer),
                        transcript,
                        status: RunStatus::Done,
                        steps,
                        run_id,
                    });
                }
                LoopState::Stopped { steps } => {
                    info!(steps, "Run stopped at the step limit");
                    return Ok(RunOutcome {
                        final_answer: None,
                        transcript,
                        status: RunStatus::Stopped,
                        steps,
                        run_id,
                    });
                }
            };
        }
    }
}

/// Await `fut`, unless the cancel flag turns `true` first.
///
/// A dropped sender means cancellation can no longer happen.
async fn until_cancelled<F: Future>(
    fut: F,
    cancel_rx: &mut Option<watch::Receiver<bool>>,
) -> Result<F::Output, RunError> {
    let Some(rx) = cancel_rx.as_mut() else {
        return Ok(fut.await);
    };
    if *rx.borrow() {
        return Err(RunError::Cancelled);
    }

    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Ok(out),
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(fut.await);
                }
                if *rx.borrow() {
                    return Err(RunError::Cancelled);
                }
            }
        }
    }
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// Start servers, run one goal, and stop the servers on every exit path.
///
/// If the run succeeds but shutdown fails, the outcome is returned inside
/// [`RunError::Shutdown`]. If both fail, the run error wins.
pub async fn run_with_servers(
    settings: &Settings,
    servers: Vec<ServerSpec>,
    planner: BoxedPlanner,
    log: Arc<dyn LogSink>,
    goal: impl Into<Goal>,
    options: RunOptions,
) -> Result<RunOutcome, RunError> {
    let mut hub = Hub::new(servers).with_tool_timeout(settings.tool_timeout);
    let started = hub.start().await;
    let hub = Arc::new(hub);

    let result = match started {
        Err(e) => Err(RunError::from(e)),
        Ok(()) => {
            let invoker = ToolInvoker::new(hub.clone(), log).with_policy(settings.retry_policy());
            let orchestrator = Orchestrator::new(invoker, planner, OrchestratorConfig::from(settings))
                .with_callbacks(options.callbacks);
            match options.cancel {
                Some(rx) => orchestrator.run_goal_with_cancel(goal, options.max_steps, rx).await,
                None => orchestrator.run_goal(goal, options.max_steps).await,
            }
        }
    };

    let stopped = hub.stop().await;
    match (result, stopped) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(outcome), Err(source)) => Err(RunError::Shutdown {
            outcome: Box::new(outcome),
            source,
        }),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop_error)) => {
            warn!(error = %stop_error, "Shutdown also failed after run error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::mcp::{CallToolResult, McpError, RetryPolicy, ToolBackend};
    use crate::planner::Planner;
    use crate::runlog::MemoryLog;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Planner that replays a script, then repeats `fallback`.
    struct ScriptedPlanner {
        script: Mutex<VecDeque<Result<PlanDecision, PlannerError>>>,
        fallback: Option<PlanDecision>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedPlanner {
        fn new(script: Vec<Result<PlanDecision, PlannerError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn repeating(decision: PlanDecision) -> Self {
            let mut planner = Self::new(Vec::new());
            planner.fallback = Some(decision);
            planner
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn decide(
            &self,
            system_prompt: &str,
            _transcript: &[Message],
            schema: Option<&Value>,
        ) -> Result<PlanDecision, PlannerError> {
            assert!(schema.is_some());
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            self.fallback
                .clone()
                .ok_or_else(|| PlannerError::malformed("script exhausted", ""))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "script"
        }
    }

    /// Backend with one server `demo`: `list` succeeds, `fail` reports an error.
    struct StubBackend;

    #[async_trait]
    impl ToolBackend for StubBackend {
        fn is_connected(&self, server: &str) -> bool {
            server == "demo"
        }

        fn tools_spec(&self) -> String {
            "- demo.list: List items\n- demo.fail: Always fails".to_string()
        }

        async fn call_tool(&self, _server: &str, tool: &str, _arguments: Value) -> Result<CallToolResult, McpError> {
            match tool {
                "list" => Ok(CallToolResult::text("alpha\nbeta")),
                "big" => Ok(CallToolResult::text("x".repeat(5000))),
                _ => Ok(CallToolResult::error("tool exploded")),
            }
        }
    }

    fn orchestrator(planner: ScriptedPlanner, log: Arc<MemoryLog>) -> Orchestrator {
        let invoker = ToolInvoker::new(Arc::new(StubBackend), log).with_policy(RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        });
        Orchestrator::new(invoker, Box::new(planner), OrchestratorConfig::default())
    }

    fn list_call() -> PlanDecision {
        PlanDecision::call_tool("demo", "list", json!({}))
    }

    #[tokio::test]
    async fn test_final_answer_on_third_step() {
        let planner = ScriptedPlanner::new(vec![
            Ok(list_call()),
            Ok(list_call()),
            Ok(PlanDecision::final_answer("two items")),
        ]);
        let calls = planner.calls.clone();
        let log = Arc::new(MemoryLog::new());

        let outcome = orchestrator(planner, log.clone()).run_goal("count items", None).await.unwrap();

        assert_eq!(outcome.final_answer.as_deref(), Some("two items"));
        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.steps, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.transcript.len(), 6);
        assert_eq!(outcome.transcript[5], Message::assistant("two items"));
        assert_eq!(log.records().len(), 2);
    }

    #[tokio::test]
    async fn test_step_ceiling() {
        for max_steps in [1usize, 4] {
            let planner = ScriptedPlanner::repeating(list_call());
            let calls = planner.calls.clone();
            let log = Arc::new(MemoryLog::new());

            let outcome = orchestrator(planner, log)
                .run_goal("loop forever", Some(max_steps))
                .await
                .unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), max_steps);
            assert_eq!(outcome.final_answer, None);
            assert_eq!(outcome.status, RunStatus::Stopped);
            assert_eq!(outcome.steps, max_steps);
            assert_eq!(outcome.transcript.len(), 1 + 2 * max_steps);
        }
    }

    #[tokio::test]
    async fn test_transcript_shape_on_success() {
        let planner = ScriptedPlanner::new(vec![Ok(list_call()), Ok(PlanDecision::final_answer("done"))]);
        let outcome = orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal(Goal::new("list").with_mode("brief"), None)
            .await
            .unwrap();

        let t = &outcome.transcript;
        assert_eq!(t[0], Message::user("list\nMode: brief"));
        assert_eq!(t[1], Message::assistant("TOOL demo.list OK"));
        assert_eq!(
            t[2],
            Message::user(r#"Tool result (summary): {"text":"alpha\nbeta"}"#)
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back() {
        let planner = ScriptedPlanner::new(vec![
            Ok(PlanDecision::call_tool("demo", "fail", json!({}))),
            Ok(PlanDecision::call_tool("ghost", "search", json!({}))),
            Ok(PlanDecision::final_answer("gave up")),
        ]);
        let log = Arc::new(MemoryLog::new());
        let outcome = orchestrator(planner, log.clone()).run_goal("try", None).await.unwrap();

        assert_eq!(outcome.final_answer.as_deref(), Some("gave up"));
        assert_eq!(outcome.transcript.len(), 4);
        assert!(outcome.transcript[1].content.starts_with("Error demo.fail: "));
        assert!(outcome.transcript[1].content.contains("tool exploded"));
        assert!(outcome.transcript[2].content.starts_with("Error ghost.search: "));

        // isError is not retried; the unknown server never reaches the backend.
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_malformed_decision_is_fatal() {
        let planner = ScriptedPlanner::new(vec![
            Ok(list_call()),
            Err(PlannerError::malformed("not valid JSON", "blah")),
        ]);
        let calls = planner.calls.clone();
        let err = orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal("x", None)
            .await
            .unwrap_err();

        assert!(err.is_malformed_decision());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_lists_live_tools() {
        let planner = ScriptedPlanner::new(vec![Ok(PlanDecision::final_answer("ok"))]);
        let prompts = planner.prompts.clone();
        orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal("x", None)
            .await
            .unwrap();

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- demo.list: List items"));
        assert!(prompts[0].contains("Reply STRICTLY in JSON"));
        assert!(prompts[0].ends_with(crate::config::DEFAULT_STRATEGY_HINT));
    }

    #[tokio::test]
    async fn test_observation_is_truncated() {
        let planner = ScriptedPlanner::new(vec![
            Ok(PlanDecision::call_tool("demo", "big", json!({}))),
            Ok(PlanDecision::final_answer("ok")),
        ]);
        let outcome = orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal("x", None)
            .await
            .unwrap();

        let observation = &outcome.transcript[2].content;
        let snippet = observation.strip_prefix("Tool result (summary): ").unwrap();
        assert_eq!(snippet.chars().count(), 1500);
    }

    #[tokio::test]
    async fn test_callbacks_fire() {
        let decisions = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));
        let callbacks = OrchestratorCallbacks {
            on_decision: Some({
                let decisions = decisions.clone();
                Arc::new(move |_: usize, _: &PlanDecision| {
                    decisions.fetch_add(1, Ordering::SeqCst);
                })
            }),
            on_tool_result: Some({
                let results = results.clone();
                Arc::new(move |tool: &str, ok: bool, _: &str| {
                    results.lock().unwrap().push((tool.to_string(), ok));
                })
            }),
        };

        let planner = ScriptedPlanner::new(vec![
            Ok(list_call()),
            Ok(PlanDecision::call_tool("demo", "fail", json!({}))),
            Ok(PlanDecision::final_answer("ok")),
        ]);
        orchestrator(planner, Arc::new(MemoryLog::new()))
            .with_callbacks(callbacks)
            .run_goal("x", None)
            .await
            .unwrap();

        assert_eq!(decisions.load(Ordering::SeqCst), 3);
        assert_eq!(
            *results.lock().unwrap(),
            vec![("demo.list".to_string(), true), ("demo.fail".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_planning() {
        let mut planner = ScriptedPlanner::repeating(list_call());
        planner.delay = Duration::from_millis(500);
        let (tx, rx) = watch::channel(false);

        let orchestrator = orchestrator(planner, Arc::new(MemoryLog::new()));
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let err = orchestrator.run_goal_with_cancel("x", None, rx).await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        cancel.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_already_set() {
        let planner = ScriptedPlanner::repeating(list_call());
        let calls = planner.calls.clone();
        let (_tx, rx) = watch::channel(true);

        let err = orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal_with_cancel("x", None, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_does_not_cancel() {
        let planner = ScriptedPlanner::new(vec![Ok(PlanDecision::final_answer("ok"))]);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let outcome = orchestrator(planner, Arc::new(MemoryLog::new()))
            .run_goal_with_cancel("x", None, rx)
            .await
            .unwrap();
        assert_eq!(outcome.final_answer.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_run_with_servers_stops_after_start_failure() {
        let settings = Settings::default();
        let planner = ScriptedPlanner::new(Vec::new());
        let calls = planner.calls.clone();

        let err = run_with_servers(
            &settings,
            vec![ServerSpec::stdio("broken", "conductor-no-such-binary-xyz")],
            Box::new(planner),
            Arc::new(MemoryLog::new()),
            "x",
            RunOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::Hub(McpError::ServerStart { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 3), "hel");
        assert_eq!(truncate_str("héllo", 2), "hé");
        assert_eq!(truncate_str("", 0), "");
    }
}
