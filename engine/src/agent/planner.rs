//! Next-step planning
//!
//! The [`StepPlanner`] trait is the seam to the model-inference
//! collaborator. [`LlmStepPlanner`] renders a [`StepRequest`] into a
//! conversation for any [`LLMProvider`] and parses the reply into a
//! [`StepProposal`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::step::{Step, StepContractError, StepKind, StepProposal};
use crate::llm::{extract_json_object, LLMError, LLMProvider, Message};
use crate::tools::{ToolCategory, ToolName, ToolRegistry, ToolSelection};

/// Previous extraction is truncated to this many characters in the prompt
const MAX_EXTRACTION_CHARS: usize = 8_000;

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Contract(#[from] StepContractError),
}

/// Catalogue entry as shown to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub category: ToolCategory,
    pub description: &'static str,
    pub enabled: bool,
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Describe every registered tool, flagged by `selection`
    pub fn catalogue(registry: &ToolRegistry, selection: &ToolSelection) -> Vec<Self> {
        registry
            .tools()
            .map(|tool| ToolDescriptor {
                name: tool.name,
                category: tool.category(),
                description: tool.description,
                enabled: selection.is_enabled(tool.name),
                parameters: tool.schema.to_json_schema(),
            })
            .collect()
    }
}

/// Everything the planner sees when choosing a step
#[derive(Debug, Clone, Serialize)]
pub struct StepRequest {
    pub goal: String,
    pub session_id: String,
    pub prior_steps: Vec<Step>,
    pub previous_extraction: Option<Value>,
    pub tools: Vec<ToolDescriptor>,
    pub language: String,
    pub repetition_hint: Option<String>,
}

#[async_trait]
pub trait StepPlanner: Send + Sync {
    async fn next_step(&self, request: &StepRequest) -> Result<StepProposal, PlannerError>;
}

/// Planner backed by a chat model
pub struct LlmStepPlanner {
    provider: Arc<dyn LLMProvider>,
}

impl LlmStepPlanner {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    fn system_prompt(request: &StepRequest) -> String {
        let kinds: Vec<&str> = StepKind::ALL.iter().map(|k| k.as_str()).collect();

        let mut enabled = String::new();
        let mut disabled = Vec::new();
        for tool in &request.tools {
            if tool.enabled {
                enabled.push_str(&format!(
                    "- {} ({}): {}\n  parameters: {}\n",
                    tool.name,
                    tool.category.as_str(),
                    tool.description,
                    tool.parameters
                ));
            } else {
                disabled.push(tool.name.as_str());
            }
        }
        if enabled.is_empty() {
            enabled.push_str("- (none)\n");
        }

        let disabled = if disabled.is_empty() {
            String::new()
        } else {
            format!(
                "\nThese tools exist but are disabled for this run, never call them: {}\n",
                disabled.join(", ")
            )
        };

        format!(
            "You are an autonomous agent working toward a goal one step at a time.\n\
             Each reply is exactly one JSON object:\n\
             {{\"text\": \"what you are doing\", \"reasoning\": \"why\", \"tool\": \"<KIND>\", \"instruction\": \"...\"}}\n\
             \n\
             Valid kinds: {kinds}.\n\
             - NAVIGATE: instruction is a URL\n\
             - INTERACT: instruction describes one page action\n\
             - EXTRACT: instruction says what to read from the page\n\
             - OBSERVE: instruction says which elements to look for\n\
             - WAIT: instruction is a number of milliseconds\n\
             - NAVIGATE_BACK: no instruction\n\
             - CALL_TOOL: instruction is {{\"toolName\": \"<name>\", \"params\": {{...}}}}\n\
             - TERMINATE: the goal is achieved; instruction is the final answer\n\
             \n\
             Browser steps need an active session: call start_browser_session first.\n\
             Failed results are shown to you; read the error and correct the next step.\n\
             \n\
             Enabled tools:\n{enabled}{disabled}\n\
             Write text and reasoning in language '{language}'.",
            kinds = kinds.join(", "),
            enabled = enabled,
            disabled = disabled,
            language = request.language,
        )
    }

    fn user_prompt(request: &StepRequest) -> String {
        let mut prompt = format!(
            "Goal: {}\nSession: {}\n",
            request.goal, request.session_id
        );

        if request.prior_steps.is_empty() {
            prompt.push_str("\nNo steps taken yet. Choose the first step.\n");
        } else {
            prompt.push_str("\nSteps so far:\n");
            for step in &request.prior_steps {
                prompt.push_str(&format!(
                    "{}. {} {} ({})\n",
                    step.sequence,
                    step.kind,
                    step.instruction.as_text(),
                    step.rationale
                ));
            }
        }

        if let Some(extraction) = &request.previous_extraction {
            let mut rendered = extraction.to_string();
            if rendered.len() > MAX_EXTRACTION_CHARS {
                let mut cut = MAX_EXTRACTION_CHARS;
                while !rendered.is_char_boundary(cut) {
                    cut -= 1;
                }
                rendered.truncate(cut);
                rendered.push_str("...");
            }
            prompt.push_str(&format!("\nResult of the previous step:\n{}\n", rendered));
        }

        if let Some(hint) = &request.repetition_hint {
            prompt.push_str(&format!("\nNote: {}\n", hint));
        }

        prompt.push_str("\nReply with the next step as a single JSON object.");
        prompt
    }

    pub fn build_messages(request: &StepRequest) -> Vec<Message> {
        vec![
            Message::system(Self::system_prompt(request)),
            Message::user(Self::user_prompt(request)),
        ]
    }

    /// Parse raw model output into a proposal
    pub fn parse_reply(content: &str) -> Result<StepProposal, PlannerError> {
        let value = extract_json_object(content).ok_or_else(|| {
            let preview: String = content.chars().take(200).collect();
            StepContractError::Malformed(preview)
        })?;
        Ok(StepProposal::from_json(&value)?)
    }
}

#[async_trait]
impl StepPlanner for LlmStepPlanner {
    async fn next_step(&self, request: &StepRequest) -> Result<StepProposal, PlannerError> {
        let messages = Self::build_messages(request);
        let reply = self.provider.generate(&messages).await?;
        debug!("Planner reply: {}", reply);

        Self::parse_reply(&reply).map_err(|e| {
            warn!("Unusable planner reply from {}: {}", self.provider.name(), e);
            e
        })
    }
}
