// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use conductor::config::{load_servers_file, resolve_config_path, ServersConfig, Settings, CONFIG_ENV_VAR};
use conductor::orchestrator::{run_with_servers, Goal, OrchestratorCallbacks, RunOptions, RunOutcome};
use conductor::planner::{create_planner, PlanDecision};
use conductor::runlog::RunLog;
use conductor::telemetry::{init_telemetry, TelemetryConfig};
use conductor::{Hub, RunError};

/// Conductor - plan and run multi-step tasks across MCP tool servers.
#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about = "Plan and run multi-step tasks across MCP tool servers", long_about = None)]
struct Cli {
    /// Server configuration file (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Planner backend
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    /// Planner model
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Directory for run logs
    #[arg(long, global = true, env = "LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Show progress details
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Groq hosted API
    Groq,
    /// Local Ollama server
    Ollama,
}

impl Backend {
    fn as_str(self) -> &'static str {
        match self {
            Backend::Groq => "groq",
            Backend::Ollama => "ollama",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal to completion
    Run {
        /// What to achieve
        goal: String,

        /// Planning calls before giving up
        #[arg(long)]
        max_steps: Option<usize>,

        /// Working mode passed to the planner, e.g. brief
        #[arg(long)]
        mode: Option<String>,

        /// Output requirement passed to the planner, e.g. a target file
        #[arg(long)]
        output: Option<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the configured servers and list their tools
    Tools {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let telemetry = if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default().with_level(tracing::Level::INFO)
    } else {
        TelemetryConfig::default()
    };
    let _guard = init_telemetry(&telemetry)?;

    let settings = load_settings(&cli)?;
    let cwd = std::env::current_dir()?;
    let config_path = resolve_config_path(cli.config.as_deref(), std::env::var(CONFIG_ENV_VAR).ok(), &cwd);
    let servers = load_servers_file(&config_path)
        .with_context(|| format!("Failed to load server config {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), servers = servers.len(), "Loaded server config");

    match cli.command {
        Commands::Run {
            goal,
            max_steps,
            mode,
            output,
            json,
        } => {
            let mut goal = Goal::new(goal);
            goal.mode = mode;
            goal.output = output;
            handle_run(&settings, servers, goal, max_steps, json, cli.verbose).await
        }
        Commands::Tools { json } => handle_tools(&settings, servers, json).await,
    }
}

/// Environment settings with CLI flags layered on top.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let backend = cli.backend.map(Backend::as_str);
    let mut settings = Settings::from_lookup(|key| match (key, backend) {
        ("LLM_BACKEND", Some(b)) => Some(b.to_string()),
        _ => std::env::var(key).ok(),
    })?;

    if let Some(model) = &cli.model {
        settings.planner.model = Some(model.clone());
    }
    if let Some(dir) = &cli.logs_dir {
        settings.logs_dir = dir.clone();
    }
    Ok(settings)
}

async fn handle_run(
    settings: &Settings,
    servers: ServersConfig,
    goal: Goal,
    max_steps: Option<usize>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let planner = create_planner(&settings.planner)?;
    let log = RunLog::create(&settings.logs_dir)
        .with_context(|| format!("Failed to create run log in {}", settings.logs_dir.display()))?;
    let log_path = log.path().to_path_buf();

    let spinner = spinner(&format!("Planning with {} ({})", planner.name(), planner.model()));
    let options = RunOptions {
        max_steps,
        callbacks: progress_callbacks(&spinner, verbose),
        cancel: Some(cancel_on_ctrl_c()),
    };

    let result = run_with_servers(settings, servers.servers, planner, Arc::new(log), goal, options).await;
    match result {
        Ok(outcome) => {
            spinner.finish_and_clear();
            print_outcome(&outcome, json)?;
        }
        Err(RunError::Shutdown { outcome, source }) => {
            spinner.finish_and_clear();
            print_outcome(&outcome, json)?;
            eprintln!("{} {}", "Warning:".yellow(), source);
        }
        Err(e) => {
            spinner.abandon_with_message(format!("{}", "Run failed".red()));
            eprintln!("{}", format!("Log: {}", log_path.display()).dimmed());
            return Err(e.into());
        }
    }

    eprintln!("{}", format!("Log: {}", log_path.display()).dimmed());
    Ok(())
}

async fn handle_tools(settings: &Settings, servers: ServersConfig, json: bool) -> anyhow::Result<()> {
    let mut hub = Hub::new(servers.servers).with_tool_timeout(settings.tool_timeout);
    let started = hub.start().await;

    if started.is_ok() {
        if json {
            let tools: Vec<_> = hub.tools().collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        } else {
            for name in hub.server_names() {
                println!("{} {}", "●".green(), name.bold());
            }
            println!("{}", hub.available_tools_spec());
        }
    }

    let stopped = hub.stop().await;
    started?;
    stopped?;
    Ok(())
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match &outcome.final_answer {
        Some(answer) => println!("{}", answer),
        None => println!(
            "{}",
            format!("Stopped after {} steps without a final answer.", outcome.steps).yellow()
        ),
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn progress_callbacks(spinner: &ProgressBar, verbose: bool) -> OrchestratorCallbacks {
    let on_decision = {
        let pb = spinner.clone();
        Arc::new(move |step: usize, decision: &PlanDecision| {
            let msg = match decision {
                PlanDecision::CallTool { server, tool, .. } => {
                    format!("Step {}: calling {}.{}", step, server, tool)
                }
                PlanDecision::FinalAnswer { .. } => format!("Step {}: final answer", step),
            };
            pb.set_message(msg);
        })
    };
    let on_tool_result = {
        let pb = spinner.clone();
        Arc::new(move |tool: &str, ok: bool, detail: &str| {
            if !verbose {
                return;
            }
            let line = if ok {
                format!("{} {}", "✓".green(), tool)
            } else {
                format!("{} {}: {}", "✗".red(), tool, detail)
            };
            pb.println(line);
        })
    };

    OrchestratorCallbacks {
        on_decision: Some(on_decision),
        on_tool_result: Some(on_tool_result),
    }
}

/// A receiver that turns `true` on the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}
