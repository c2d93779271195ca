//! Browser automation collaborators
//!
//! Browser-kind steps are executed by a [`BrowserAutomation`] backend:
//!
//! - [`OfflineAutomation`]: no remote backend, synthetic payloads
//! - [`RemoteAutomation`]: HTTP automation service
//!
//! Both sit behind [`BrowserGateway`], which refuses any primitive for a
//! session the [`SessionTracker`] does not report as active. A refused step
//! never reaches the backend.

pub mod offline;
pub mod remote;

pub use offline::OfflineAutomation;
pub use remote::RemoteAutomation;

use async_trait::async_trait;
use sdk::types::{ErrorKind, ExecutionResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{BrowserConfig, BrowserMode};
use crate::session::SessionTracker;

/// Session ids with these prefixes always run against the offline backend
pub const OFFLINE_SESSION_PREFIXES: &[&str] = &["mock-", "fallback-"];

/// Ceiling for WAIT in offline mode
pub const OFFLINE_MAX_WAIT: Duration = Duration::from_secs(1);

/// Action the automation backend performs against a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserPrimitive {
    Navigate,
    Interact,
    Extract,
    Observe,
    Wait,
    NavigateBack,
}

impl BrowserPrimitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserPrimitive::Navigate => "navigate",
            BrowserPrimitive::Interact => "interact",
            BrowserPrimitive::Extract => "extract",
            BrowserPrimitive::Observe => "observe",
            BrowserPrimitive::Wait => "wait",
            BrowserPrimitive::NavigateBack => "navigate_back",
        }
    }
}

impl fmt::Display for BrowserPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by automation backends
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("Automation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Automation backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Automation request timed out")]
    Timeout,

    #[error("Invalid instruction for {primitive}: {reason}")]
    InvalidInstruction {
        primitive: BrowserPrimitive,
        reason: String,
    },

    #[error("Failed to parse automation response: {0}")]
    Parse(String),
}

/// Backend executing primitives against an automation session
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Short backend name for logs and payloads
    fn mode(&self) -> &'static str;

    async fn execute(
        &self,
        session_id: &str,
        primitive: BrowserPrimitive,
        instruction: &str,
    ) -> Result<Value, AutomationError>;
}

/// Parse a WAIT instruction as whole milliseconds
pub(crate) fn parse_wait_ms(instruction: &str) -> Result<u64, AutomationError> {
    let trimmed = instruction.trim();
    let ms: f64 = trimmed.parse().map_err(|_| AutomationError::InvalidInstruction {
        primitive: BrowserPrimitive::Wait,
        reason: format!("expected milliseconds, got '{}'", trimmed),
    })?;
    if !ms.is_finite() || ms < 0.0 {
        return Err(AutomationError::InvalidInstruction {
            primitive: BrowserPrimitive::Wait,
            reason: format!("expected a non-negative duration, got '{}'", trimmed),
        });
    }
    Ok(ms as u64)
}

/// Session gate in front of the automation backends
pub struct BrowserGateway {
    sessions: Arc<SessionTracker>,
    backend: Arc<dyn BrowserAutomation>,
    offline: Arc<dyn BrowserAutomation>,
}

impl BrowserGateway {
    pub fn new(sessions: Arc<SessionTracker>, backend: Arc<dyn BrowserAutomation>) -> Self {
        Self {
            sessions,
            backend,
            offline: Arc::new(OfflineAutomation::new()),
        }
    }

    /// Build the backend selected by configuration.
    ///
    /// Remote mode without an API key in the configured environment variable
    /// falls back to offline mode.
    pub fn from_config(
        config: &BrowserConfig,
        sessions: Arc<SessionTracker>,
    ) -> Result<Self, AutomationError> {
        let backend: Arc<dyn BrowserAutomation> = match config.mode {
            BrowserMode::Offline => Arc::new(OfflineAutomation::new()),
            BrowserMode::Remote => match std::env::var(&config.api_key_env) {
                Ok(key) if !key.trim().is_empty() => Arc::new(RemoteAutomation::new(
                    config.base_url.clone(),
                    Some(key),
                    Duration::from_secs(config.timeout_secs),
                )?),
                _ => {
                    warn!(
                        "{} not set, browser automation runs in offline mode",
                        config.api_key_env
                    );
                    Arc::new(OfflineAutomation::new())
                }
            },
        };
        Ok(Self::new(sessions, backend))
    }

    pub fn mode(&self) -> &'static str {
        self.backend.mode()
    }

    /// Run one primitive if the session is active
    pub async fn execute(
        &self,
        session_id: &str,
        primitive: BrowserPrimitive,
        instruction: &str,
    ) -> ExecutionResult {
        if !self.sessions.is_active(session_id) {
            warn!(
                "Refusing {} for inactive session {}",
                primitive, session_id
            );
            return ExecutionResult::failure(
                ErrorKind::SessionNotActive,
                format!(
                    "Browser session '{}' is not active. Start it with start_browser_session first.",
                    session_id
                ),
            )
            .with_details(json!({
                "sessionId": session_id,
                "status": self.sessions.status(session_id).as_str(),
            }));
        }

        let backend = if OFFLINE_SESSION_PREFIXES
            .iter()
            .any(|p| session_id.starts_with(p))
        {
            &self.offline
        } else {
            &self.backend
        };

        debug!(
            "Executing {} on session {} via {} backend",
            primitive,
            session_id,
            backend.mode()
        );

        match backend.execute(session_id, primitive, instruction).await {
            Ok(payload) => ExecutionResult::success(payload),
            Err(e) => {
                warn!("Automation {} failed: {}", primitive, e);
                ExecutionResult::failure(ErrorKind::ToolExecutionError, e.to_string())
                    .with_details(json!({
                        "primitive": primitive.as_str(),
                        "backend": backend.mode(),
                    }))
            }
        }
    }
}
