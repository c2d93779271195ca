//! Error types and handling
//!
//! Engine errors cover infrastructure failures (configuration, I/O, the
//! model-inference and browser-automation transports, startup registration).
//! Per-step failures inside a run are never raised as `EngineError`; they are
//! carried as data in [`crate::types::ExecutionResult`].

use thiserror::Error;

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::EngineError;
///
/// let error = EngineError::UnknownTool("teleport".to_string());
/// assert_eq!(error.user_hint(), "The requested tool is not available");
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Tool registry errors
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameter schema: {0}")]
    Schema(String),

    // Model-inference collaborator errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Browser-automation collaborator errors
    #[error("Automation backend error: {0}")]
    Automation(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short hint that is safe to show to end users
    ///
    /// Never echoes the error message itself, which may carry paths or
    /// backend responses.
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::DuplicateTool(_) | Self::Schema(_) => {
                "The tool catalogue is inconsistent. This is a bug in the build"
            }
            Self::UnknownTool(_) => "The requested tool is not available",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your settings and network",
            Self::Automation(_) => "Browser automation backend failed. Check its configuration",
            Self::Io(_) => "File system operation failed",
        }
    }
}
