//! Agent Core - the step orchestration loop
//!
//! Drives a goal to completion one step at a time:
//! 1. Ask the planner for the next step (bounded by the LLM timeout)
//! 2. Execute it: browser primitives through the session gate, CALL_TOOL
//!    through the dispatcher, TERMINATE ends the run
//! 3. Feed the result (success or failure) forward as the next extraction
//! 4. Repeat until a terminal status is reached
//!
//! Limits:
//! - `max_total_steps` steps per run
//! - `max_consecutive_session_errors` SessionNotActive results in a row
//! - `max_result_bytes` per step payload
//!
//! The three caller-facing operations ([`AgentCore::start`],
//! [`AgentCore::next_step`], [`AgentCore::execute_step`]) are stateless apart
//! from the shared session tracker and loop detector; [`AgentCore::run`]
//! composes them.

use sdk::errors::EngineError;
use sdk::types::{ErrorKind, ExecutionResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::planner::{PlannerError, StepPlanner, StepRequest, ToolDescriptor};
use super::step::{next_sequence, Step, StepContractError, StepKind};
use crate::browser::BrowserGateway;
use crate::clock::Clock;
use crate::config::{AgentConfig, Config};
use crate::session::SessionTracker;
use crate::tools::{LoopDetector, ToolContext, ToolDispatcher, ToolName, ToolRegistry, ToolSelection};

/// Why a step could not be produced
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Goal must not be empty")]
    EmptyGoal,

    #[error("Model collaborator did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Contract(#[from] StepContractError),
}

impl StepError {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            StepError::Contract(_) | StepError::Planner(PlannerError::Contract(_)) => {
                Some(ErrorKind::StepContractViolation)
            }
            _ => None,
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    StepLimitReached,
    SessionError,
    FatalToolError,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::StepLimitReached => "step-limit-reached",
            RunStatus::SessionError => "session-error",
            RunStatus::FatalToolError => "fatal-tool-error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: Step,
    pub result: ExecutionResult,
}

/// Outcome of [`AgentCore::run`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub goal: String,
    pub session_id: String,
    pub status: RunStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub steps: Vec<StepRecord>,
    pub last_result: Option<ExecutionResult>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last().map(|r| &r.step)
    }
}

/// Trailing run of identical action keys, as a hint for the planner
pub fn repetition_hint(prior_steps: &[Step], threshold: usize) -> Option<String> {
    if threshold == 0 {
        return None;
    }
    let last = prior_steps.last()?.action_key();
    let run = prior_steps
        .iter()
        .rev()
        .take_while(|s| s.action_key() == last)
        .count();

    (run >= threshold).then(|| {
        format!(
            "The last {} steps all used '{}'. If this is not making progress, \
             try a different approach or TERMINATE with what you have.",
            run, last
        )
    })
}

pub struct AgentCore {
    planner: Arc<dyn StepPlanner>,
    dispatcher: Arc<ToolDispatcher>,
    browser: Arc<BrowserGateway>,
    sessions: Arc<SessionTracker>,
    limits: AgentConfig,
    planner_timeout: Duration,
    language: String,
}

impl AgentCore {
    pub fn new(
        planner: Arc<dyn StepPlanner>,
        dispatcher: Arc<ToolDispatcher>,
        browser: Arc<BrowserGateway>,
        sessions: Arc<SessionTracker>,
        limits: AgentConfig,
        planner_timeout: Duration,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            browser,
            sessions,
            limits,
            planner_timeout,
            language: "en".to_string(),
        }
    }

    /// Wire the full engine from configuration
    pub fn from_config(
        config: &Config,
        planner: Arc<dyn StepPlanner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let sessions = Arc::new(SessionTracker::new(clock.clone()));
        let ctx = ToolContext::from_config(config, Arc::clone(&sessions), clock.clone());
        let registry = Arc::new(ToolRegistry::with_defaults(&ctx)?);
        let detector = Arc::new(LoopDetector::from_config(&config.loop_detection));
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            detector,
            clock,
            config.tools.handler_timeout(),
        ));
        let browser = BrowserGateway::from_config(&config.browser, Arc::clone(&sessions))
            .map_err(|e| EngineError::Automation(e.to_string()))?;

        Ok(Self::new(
            planner,
            dispatcher,
            Arc::new(browser),
            sessions,
            config.agent.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )
        .with_language(config.core.language.clone()))
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn browser_mode(&self) -> &'static str {
        self.browser.mode()
    }

    pub fn limits(&self) -> &AgentConfig {
        &self.limits
    }

    /// START: first step for a new goal
    pub async fn start(
        &self,
        goal: &str,
        session_id: &str,
        tools: &ToolSelection,
    ) -> Result<Step, StepError> {
        info!("Starting goal on session {}: {}", session_id, goal);
        self.next_step(goal, session_id, &[], None, tools).await
    }

    /// GET_NEXT_STEP: plan the step after `prior_steps`
    pub async fn next_step(
        &self,
        goal: &str,
        session_id: &str,
        prior_steps: &[Step],
        previous_extraction: Option<&Value>,
        tools: &ToolSelection,
    ) -> Result<Step, StepError> {
        if goal.trim().is_empty() {
            return Err(StepError::EmptyGoal);
        }
        let sequence = next_sequence(prior_steps)?;

        let request = StepRequest {
            goal: goal.to_string(),
            session_id: session_id.to_string(),
            prior_steps: prior_steps.to_vec(),
            previous_extraction: previous_extraction.cloned(),
            tools: ToolDescriptor::catalogue(self.dispatcher.registry(), tools),
            language: self.language.clone(),
            repetition_hint: repetition_hint(prior_steps, self.limits.soft_repeat_threshold),
        };
        if let Some(hint) = &request.repetition_hint {
            debug!("Repetition hint: {}", hint);
        }

        let proposal = tokio::time::timeout(self.planner_timeout, self.planner.next_step(&request))
            .await
            .map_err(|_| StepError::Timeout(self.planner_timeout))??;

        let step = proposal.into_step(sequence);
        debug!(
            "Planned step {}: {} {}",
            step.sequence,
            step.kind,
            step.instruction.as_text()
        );
        Ok(step)
    }

    /// EXECUTE_STEP: run one step and report the outcome as data
    pub async fn execute_step(
        &self,
        session_id: &str,
        step: &Step,
        tools: &ToolSelection,
    ) -> ExecutionResult {
        let result = if let Some(primitive) = step.kind.primitive() {
            self.browser
                .execute(session_id, primitive, &step.instruction.as_text())
                .await
        } else if step.kind == StepKind::CallTool {
            self.call_tool(step, tools).await
        } else {
            ExecutionResult::success(json!({
                "done": true,
                "answer": step.instruction.as_text(),
            }))
        };

        self.cap_payload(result)
    }

    async fn call_tool(&self, step: &Step, tools: &ToolSelection) -> ExecutionResult {
        let invocation = match step.instruction.tool_invocation() {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Step {}: {}", step.sequence, e);
                return ExecutionResult::failure(ErrorKind::StepContractViolation, e.to_string())
                    .with_details(json!({
                        "expected": { "toolName": "<name>", "params": {} },
                    }));
            }
        };

        if let Ok(name) = ToolName::from_str(&invocation.tool_name) {
            if !tools.is_enabled(name) {
                let e = StepContractError::DisabledTool(invocation.tool_name.clone());
                warn!("Step {}: {}", step.sequence, e);
                let enabled: Vec<&str> = tools.enabled().map(|t| t.as_str()).collect();
                return ExecutionResult::failure(ErrorKind::StepContractViolation, e.to_string())
                    .with_details(json!({ "enabledTools": enabled }));
            }
        }

        self.dispatcher
            .dispatch(&invocation.tool_name, &invocation.params)
            .await
    }

    fn cap_payload(&self, result: ExecutionResult) -> ExecutionResult {
        let Some(payload) = &result.payload else {
            return result;
        };
        let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(0);
        if size <= self.limits.max_result_bytes {
            return result;
        }

        warn!(
            "Result too large ({} bytes > {} bytes), dropping payload",
            size, self.limits.max_result_bytes
        );
        ExecutionResult::failure(
            ErrorKind::ToolExecutionError,
            format!(
                "Result too large ({} bytes, limit {} bytes). Request a smaller piece of data.",
                size, self.limits.max_result_bytes
            ),
        )
        .with_details(json!({
            "sizeBytes": size,
            "limitBytes": self.limits.max_result_bytes,
        }))
    }

    /// Drive `goal` until a terminal status
    pub async fn run(&self, goal: &str, session_id: &str, tools: &ToolSelection) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        info!("Run {} started: {}", run_id, goal);

        let mut report = RunReport {
            run_id,
            goal: goal.to_string(),
            session_id: session_id.to_string(),
            status: RunStatus::Completed,
            reason: String::new(),
            error_kind: None,
            steps: Vec::new(),
            last_result: None,
        };

        let mut steps: Vec<Step> = Vec::new();
        let mut extraction: Option<Value> = None;
        let mut session_errors = 0usize;

        loop {
            if steps.len() >= self.limits.max_total_steps {
                warn!(
                    "Run {} hit the step limit ({})",
                    report.run_id, self.limits.max_total_steps
                );
                return finish(
                    report,
                    RunStatus::StepLimitReached,
                    format!(
                        "Stopped after {} steps without reaching the goal",
                        self.limits.max_total_steps
                    ),
                    Some(ErrorKind::StepLimitExceeded),
                );
            }

            let planned = if steps.is_empty() {
                self.start(goal, session_id, tools).await
            } else {
                self.next_step(goal, session_id, &steps, extraction.as_ref(), tools)
                    .await
            };
            let step = match planned {
                Ok(step) => step,
                Err(e) => {
                    error!("Run {} cannot continue: {}", report.run_id, e);
                    let kind = e.error_kind();
                    return finish(report, RunStatus::FatalToolError, e.to_string(), kind);
                }
            };

            info!(
                "Step {}: {} ({})",
                step.sequence, step.kind, step.rationale
            );
            let result = self.execute_step(session_id, &step, tools).await;
            if let Some(err) = &result.error {
                warn!("Step {} failed: {}", step.sequence, err);
            }

            session_errors = if result.is_kind(ErrorKind::SessionNotActive) {
                session_errors + 1
            } else {
                0
            };
            extraction = Some(result.extraction());

            let terminal = step.kind.is_terminal();
            steps.push(step.clone());
            report.last_result = Some(result.clone());
            report.steps.push(StepRecord { step, result });

            if terminal {
                info!("Run {} completed in {} steps", report.run_id, steps.len());
                return finish(report, RunStatus::Completed, "Goal completed".into(), None);
            }

            let max_session_errors = self.limits.max_consecutive_session_errors;
            if max_session_errors > 0 && session_errors >= max_session_errors {
                error!(
                    "Run {} stopped: session {} not active for {} steps",
                    report.run_id, session_id, session_errors
                );
                return finish(
                    report,
                    RunStatus::SessionError,
                    format!(
                        "Browser session '{}' was not active for {} consecutive steps",
                        session_id, session_errors
                    ),
                    Some(ErrorKind::SessionNotActive),
                );
            }
        }
    }
}

fn finish(
    mut report: RunReport,
    status: RunStatus,
    reason: String,
    error_kind: Option<ErrorKind>,
) -> RunReport {
    report.status = status;
    report.reason = reason;
    report.error_kind = error_kind;
    report
}
