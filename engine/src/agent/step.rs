//! Step vocabulary
//!
//! A step is one atomic action proposed by the model collaborator. Its kind
//! comes from a closed set; anything else is a contract violation, never
//! coerced. `TERMINATE` is the only kind with no successor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::browser::BrowserPrimitive;

/// Closed set of step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    Navigate,
    Interact,
    Extract,
    Observe,
    Wait,
    NavigateBack,
    CallTool,
    Terminate,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::Navigate,
        StepKind::Interact,
        StepKind::Extract,
        StepKind::Observe,
        StepKind::Wait,
        StepKind::NavigateBack,
        StepKind::CallTool,
        StepKind::Terminate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Navigate => "NAVIGATE",
            StepKind::Interact => "INTERACT",
            StepKind::Extract => "EXTRACT",
            StepKind::Observe => "OBSERVE",
            StepKind::Wait => "WAIT",
            StepKind::NavigateBack => "NAVIGATE_BACK",
            StepKind::CallTool => "CALL_TOOL",
            StepKind::Terminate => "TERMINATE",
        }
    }

    /// Automation primitive for browser-kind steps
    pub fn primitive(&self) -> Option<BrowserPrimitive> {
        match self {
            StepKind::Navigate => Some(BrowserPrimitive::Navigate),
            StepKind::Interact => Some(BrowserPrimitive::Interact),
            StepKind::Extract => Some(BrowserPrimitive::Extract),
            StepKind::Observe => Some(BrowserPrimitive::Observe),
            StepKind::Wait => Some(BrowserPrimitive::Wait),
            StepKind::NavigateBack => Some(BrowserPrimitive::NavigateBack),
            StepKind::CallTool | StepKind::Terminate => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepKind::Terminate)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = StepContractError;

    /// Accepts canonical labels plus the older `GOTO`, `ACT`, `NAVBACK` and
    /// `CLOSE` spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_uppercase();
        let kind = match label.as_str() {
            "NAVIGATE" | "GOTO" => StepKind::Navigate,
            "INTERACT" | "ACT" => StepKind::Interact,
            "EXTRACT" => StepKind::Extract,
            "OBSERVE" => StepKind::Observe,
            "WAIT" => StepKind::Wait,
            "NAVIGATE_BACK" | "NAVBACK" => StepKind::NavigateBack,
            "CALL_TOOL" => StepKind::CallTool,
            "TERMINATE" | "CLOSE" => StepKind::Terminate,
            _ => return Err(StepContractError::UnrecognizedKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Violations of the next-step contract by the model collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepContractError {
    #[error("Unrecognized step kind '{0}'")]
    UnrecognizedKind(String),

    #[error("Step proposal has no kind")]
    MissingKind,

    #[error("Step proposal is not a JSON object: {0}")]
    Malformed(String),

    #[error("Invalid CALL_TOOL instruction: {0}")]
    InvalidToolInstruction(String),

    #[error("Tool '{0}' is not enabled for this run")]
    DisabledTool(String),

    #[error("Step sequence {got} does not follow {previous}")]
    OutOfSequence { previous: u32, got: u32 },
}

/// Structured CALL_TOOL payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub params: Value,
}

/// Step payload: a tool invocation or free text (URL, action, milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepInstruction {
    Tool(ToolInvocation),
    Text(String),
}

impl StepInstruction {
    /// Lift a raw JSON instruction; objects that look like tool calls become
    /// [`ToolInvocation`]s, anything else is kept as text.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => StepInstruction::Text(String::new()),
            Some(Value::String(s)) => StepInstruction::Text(s.clone()),
            Some(v @ Value::Object(_)) => match serde_json::from_value::<ToolInvocation>(v.clone()) {
                Ok(inv) => StepInstruction::Tool(inv),
                Err(_) => StepInstruction::Text(v.to_string()),
            },
            Some(other) => StepInstruction::Text(other.to_string()),
        }
    }

    /// Text form used for browser primitives and display
    pub fn as_text(&self) -> String {
        match self {
            StepInstruction::Text(s) => s.clone(),
            StepInstruction::Tool(inv) => serde_json::to_string(inv).unwrap_or_default(),
        }
    }

    /// Interpret as a tool invocation. Text is parsed as a JSON
    /// `{"toolName": ..., "params": {...}}` string.
    pub fn tool_invocation(&self) -> Result<ToolInvocation, StepContractError> {
        match self {
            StepInstruction::Tool(inv) => Ok(inv.clone()),
            StepInstruction::Text(s) => serde_json::from_str::<ToolInvocation>(s)
                .map_err(|e| StepContractError::InvalidToolInstruction(e.to_string())),
        }
    }
}

impl Default for StepInstruction {
    fn default() -> Self {
        StepInstruction::Text(String::new())
    }
}

/// What the model collaborator proposes; the core assigns the sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProposal {
    pub kind: StepKind,
    pub rationale: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub instruction: StepInstruction,
}

impl StepProposal {
    pub fn new(kind: StepKind, rationale: impl Into<String>, instruction: StepInstruction) -> Self {
        Self {
            kind,
            rationale: rationale.into(),
            reasoning: String::new(),
            instruction,
        }
    }

    /// Convenience constructor for CALL_TOOL proposals
    pub fn call_tool(tool_name: &str, params: Value) -> Self {
        Self::new(
            StepKind::CallTool,
            format!("Calling {}", tool_name),
            StepInstruction::Tool(ToolInvocation {
                tool_name: tool_name.to_string(),
                params,
            }),
        )
    }

    /// Parse the `{text, reasoning, tool, instruction}` object the model returns
    pub fn from_json(value: &Value) -> Result<Self, StepContractError> {
        let obj = value
            .as_object()
            .ok_or_else(|| StepContractError::Malformed(value.to_string()))?;

        let label = obj
            .get("tool")
            .or_else(|| obj.get("kind"))
            .and_then(Value::as_str)
            .ok_or(StepContractError::MissingKind)?;
        let kind = StepKind::from_str(label)?;

        let text_field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            kind,
            rationale: text_field("text"),
            reasoning: text_field("reasoning"),
            instruction: StepInstruction::from_value(obj.get("instruction")),
        })
    }

    pub fn into_step(self, sequence: u32) -> Step {
        Step {
            sequence,
            kind: self.kind,
            rationale: self.rationale,
            reasoning: self.reasoning,
            instruction: self.instruction,
        }
    }
}

/// A sequenced step inside one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub sequence: u32,
    pub kind: StepKind,
    pub rationale: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub instruction: StepInstruction,
}

impl Step {
    /// Key for the same-action repetition hint: tool name for CALL_TOOL,
    /// kind label otherwise
    pub fn action_key(&self) -> String {
        match self.kind {
            StepKind::CallTool => match self.instruction.tool_invocation() {
                Ok(inv) => inv.tool_name,
                Err(_) => self.kind.as_str().to_string(),
            },
            kind => kind.as_str().to_string(),
        }
    }
}

/// Next sequence number after `prior`, checking it is strictly increasing
pub fn next_sequence(prior: &[Step]) -> Result<u32, StepContractError> {
    for pair in prior.windows(2) {
        if pair[1].sequence <= pair[0].sequence {
            return Err(StepContractError::OutOfSequence {
                previous: pair[0].sequence,
                got: pair[1].sequence,
            });
        }
    }
    Ok(prior.last().map(|s| s.sequence + 1).unwrap_or(1))
}
