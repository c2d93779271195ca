//! Execution result envelope and tool error types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy for a single dispatch or step execution.
///
/// Every kind travels as data inside an [`ExecutionResult`]; none of them is
/// ever raised across the dispatcher or orchestration boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No tool is registered under the requested name
    ToolNotFound,

    /// Parameters did not satisfy the tool's schema
    ParameterValidationError,

    /// The handler failed, panicked or exceeded its deadline
    ToolExecutionError,

    /// Identical calls repeated inside the detection window; handler not invoked
    LoopDetected,

    /// Browser-kind step attempted without an active session
    SessionNotActive,

    /// The model collaborator broke the step contract
    StepContractViolation,

    /// The run reached its step cap
    StepLimitExceeded,
}

impl ErrorKind {
    /// Stable identifier used in logs and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::ParameterValidationError => "ParameterValidationError",
            ErrorKind::ToolExecutionError => "ToolExecutionError",
            ErrorKind::LoopDetected => "LoopDetected",
            ErrorKind::SessionNotActive => "SessionNotActive",
            ErrorKind::StepContractViolation => "StepContractViolation",
            ErrorKind::StepLimitExceeded => "StepLimitExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tool dispatch or automation primitive.
///
/// Exactly one of `payload` (on success) or `error_kind` + `error` (on
/// failure) is populated. `details` carries structured diagnostics such as
/// the list of known tool names or the offending parameter fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loop_detected: bool,
}

impl ExecutionResult {
    /// Create a successful result carrying a payload
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_kind: None,
            error: None,
            details: None,
            loop_detected: false,
        }
    }

    /// Create a failed result of the given kind
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error_kind: Some(kind),
            error: Some(message.into()),
            details: None,
            loop_detected: kind == ErrorKind::LoopDetected,
        }
    }

    /// Attach structured diagnostics
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns true if this result failed with the given kind
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.error_kind == Some(kind)
    }

    /// Value to feed forward as the next step's extraction
    ///
    /// Failures are fed forward too so the model can self-correct.
    pub fn extraction(&self) -> serde_json::Value {
        match &self.payload {
            Some(payload) => payload.clone(),
            None => serde_json::json!({
                "success": false,
                "errorKind": self.error_kind,
                "error": self.error,
                "details": self.details,
            }),
        }
    }
}

/// Tool-specific errors raised by handlers
///
/// The dispatcher converts these into `ToolExecutionError` results.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Short machine-readable error type
    pub fn error_type(&self) -> &'static str {
        match self {
            ToolError::InvalidParameter(_) => "ParameterError",
            ToolError::FileNotFound(_) => "FileNotFoundError",
            ToolError::Rejected(_) => "RejectedError",
            ToolError::Execution(_) => "ExecutionError",
            ToolError::Io(_) => "IOError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let result = ExecutionResult::success(json!({ "result": 14 }));
        assert!(result.success);
        assert_eq!(result.error_kind, None);
        assert!(!result.loop_detected);
        assert_eq!(result.extraction(), json!({ "result": 14 }));
    }

    #[test]
    fn test_loop_failure_sets_flag() {
        let result = ExecutionResult::failure(ErrorKind::LoopDetected, "repeated");
        assert!(!result.success);
        assert!(result.loop_detected);
        assert!(result.is_kind(ErrorKind::LoopDetected));
    }

    #[test]
    fn test_failure_serialization_shape() {
        let result = ExecutionResult::failure(ErrorKind::ToolNotFound, "no such tool")
            .with_details(json!({ "availableTools": ["calculate"] }));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["errorKind"], json!("ToolNotFound"));
        assert_eq!(value["details"]["availableTools"], json!(["calculate"]));
        assert!(value.get("payload").is_none());
        assert!(value.get("loopDetected").is_none());
    }

    #[test]
    fn test_failure_extraction_is_fed_forward() {
        let result = ExecutionResult::failure(ErrorKind::SessionNotActive, "closed");
        let extraction = result.extraction();
        assert_eq!(extraction["errorKind"], json!("SessionNotActive"));
        assert_eq!(extraction["success"], json!(false));
    }

    #[test]
    fn test_tool_error_types() {
        assert_eq!(
            ToolError::FileNotFound("a.txt".into()).error_type(),
            "FileNotFoundError"
        );
        assert_eq!(
            ToolError::Execution("boom".into()).to_string(),
            "Execution failed: boom"
        );
    }
}
