//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Drive a goal through the orchestration loop
//! - tools: List the tool catalogue
//! - dispatch: Run one tool call through the dispatcher
//! - config show: Print the effective configuration

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::agent::{AgentCore, LlmStepPlanner, RunReport};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::llm::{LLMProvider, OllamaProvider};
use crate::session::SessionTracker;
use crate::tools::{LoopDetector, ToolContext, ToolDispatcher, ToolRegistry, ToolSelection};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Close the run's session; the agent may already have closed it
fn release_session(sessions: &SessionTracker, session_id: &str) -> bool {
    match sessions.close(session_id) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Session {} not closed at end of run: {}", session_id, e);
            false
        }
    }
}

/// Tools enabled for this invocation: CLI list, else config list, else all
pub fn tool_selection(cli_tools: &[String], config: &Config) -> Result<ToolSelection> {
    let names = if cli_tools.is_empty() {
        config.tools.enabled.as_slice()
    } else {
        cli_tools
    };
    ToolSelection::from_names(names).context("Invalid tool selection")
}

fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = Arc::new(SessionTracker::new(clock.clone()));
    let ctx = ToolContext::from_config(config, sessions, clock);
    ToolRegistry::with_defaults(&ctx).context("Failed to build tool registry")
}

/// Drive a goal to a terminal status
pub async fn handle_run(
    goal: String,
    session: Option<String>,
    cli_tools: Vec<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let tools = tool_selection(&cli_tools, config)?;

    let provider = OllamaProvider::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        std::time::Duration::from_secs(config.llm.timeout_secs),
    )
    .map_err(|e| EngineError::LLMProvider(e.to_string()))?;
    if !provider.check_health().await {
        tracing::warn!(
            "Ollama is not reachable at {}; planning will fail",
            config.llm.base_url
        );
    }
    let planner = Arc::new(LlmStepPlanner::new(Arc::new(provider)));

    let core = AgentCore::from_config(config, planner, Arc::new(SystemClock))
        .context("Failed to initialize agent")?;

    let session_id = session.unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));
    core.sessions().start(&session_id);

    if let OutputFormat::Text = format {
        println!("Goal: {}", goal);
        println!(
            "Session: {} ({} browser backend)",
            session_id,
            core.browser_mode()
        );
        println!();
    }

    let report = core.run(&goal, &session_id, &tools).await;
    release_session(core.sessions(), &session_id);

    print_report(&report, format)?;

    if report.is_completed() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Run ended with status {}: {}",
            report.status,
            report.reason
        ))
    }
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for record in &report.steps {
                let marker = if record.result.success { "✓" } else { "✗" };
                println!(
                    "{} Step {}: {} {}",
                    marker,
                    record.step.sequence,
                    record.step.kind,
                    record.step.instruction.as_text()
                );
                if !record.step.rationale.is_empty() {
                    println!("  {}", record.step.rationale);
                }
                if let Some(err) = &record.result.error {
                    println!("  Error: {}", err);
                }
            }
            println!();
            println!("Status: {}", report.status);
            println!("  Reason: {}", report.reason);
            println!("  Steps: {}", report.steps.len());
            println!("  Run ID: {}", report.run_id);
            if let Some(answer) = report
                .last_result
                .as_ref()
                .and_then(|r| r.payload.as_ref())
                .and_then(|p| p.get("answer"))
                .and_then(Value::as_str)
            {
                println!();
                println!("Answer:");
                println!("{}", answer);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// List the tool catalogue with enabled flags
pub async fn handle_tools(config: &Config, format: OutputFormat) -> Result<()> {
    let registry = build_registry(config)?;
    let selection = tool_selection(&[], config)?;

    match format {
        OutputFormat::Text => {
            println!("Tools ({} registered):", registry.len());
            println!();
            for tool in registry.tools() {
                let flag = if selection.is_enabled(tool.name) {
                    "enabled"
                } else {
                    "disabled"
                };
                println!(
                    "  {:<28} {:<13} {:<9} {}",
                    tool.name.as_str(),
                    tool.category().as_str(),
                    flag,
                    tool.description
                );
            }
        }
        OutputFormat::Json => {
            let tools: Vec<Value> = registry
                .tools()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "category": tool.category(),
                        "enabled": selection.is_enabled(tool.name),
                        "description": tool.description,
                        "parameters": tool.schema.to_json_schema(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "tools": tools }))?);
        }
    }
    Ok(())
}

/// Dispatch one tool call and print the result envelope
pub async fn handle_dispatch(
    tool: String,
    params: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let params: Value = serde_json::from_str(&params)
        .with_context(|| format!("Parameters are not valid JSON: {}", params))?;

    let dispatcher = ToolDispatcher::new(
        Arc::new(build_registry(config)?),
        Arc::new(LoopDetector::from_config(&config.loop_detection)),
        Arc::new(SystemClock),
        config.tools.handler_timeout(),
    );
    let result = dispatcher.dispatch(&tool, &params).await;

    match format {
        OutputFormat::Text => {
            if result.success {
                println!("✓ {} succeeded", tool);
                if let Some(payload) = &result.payload {
                    println!("{}", serde_json::to_string_pretty(payload)?);
                }
            } else {
                println!(
                    "✗ {} failed ({})",
                    tool,
                    result.error_kind.map(|k| k.as_str()).unwrap_or("unknown")
                );
                if let Some(err) = &result.error {
                    println!("  {}", err);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolName;

    #[test]
    fn test_cli_tools_override_config() {
        let mut config = Config::default_config();
        config.tools.enabled = vec!["calculate".into()];

        let from_config = tool_selection(&[], &config).unwrap();
        assert!(from_config.is_enabled(ToolName::Calculate));
        assert!(!from_config.is_enabled(ToolName::ReadFile));

        let from_cli = tool_selection(&["read_file".to_string()], &config).unwrap();
        assert!(from_cli.is_enabled(ToolName::ReadFile));
        assert!(!from_cli.is_enabled(ToolName::Calculate));
        assert!(from_cli.is_enabled(ToolName::FormatFinalAnswer));
    }

    #[test]
    fn test_release_session_tolerates_closed_session() {
        let sessions = SessionTracker::new(Arc::new(SystemClock));
        sessions.start("chat-1");

        assert!(release_session(&sessions, "chat-1"));
        assert!(!sessions.is_active("chat-1"));
        assert!(!release_session(&sessions, "chat-1"));
        assert!(!release_session(&sessions, "never-started"));
    }

    #[test]
    fn test_unknown_tool_in_selection() {
        let config = Config::default_config();
        let err = tool_selection(&["teleport".to_string()], &config).unwrap_err();
        assert!(format!("{:#}", err).contains("teleport"));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_workspace(dir.path().to_path_buf());
        let err = handle_dispatch("calculate".into(), "{oops".into(), &config, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
