//! Waypoint Engine Library
//!
//! This library provides the core functionality of the Waypoint agent engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Time source for loop detection and session bookkeeping
pub mod clock;

/// Browser session tracking
pub mod session;

/// Browser automation collaborators
pub mod browser;

/// LLM provider abstraction layer
pub mod llm;

/// Built-in tools, registry, loop detector and dispatcher
pub mod tools;

/// Agent loop core module
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
