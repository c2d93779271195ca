//! Waypoint SDK
//!
//! Shared types for the Waypoint engine and its tool handlers: the
//! execution result envelope, the failure taxonomy, and the engine error type.

/// Error types and handling
pub mod errors;

/// Execution result envelope and tool error types
pub mod types;

// Re-export commonly used types
pub use errors::EngineError;
pub use types::{ErrorKind, ExecutionResult, ToolError};
