//! Browser session tools
//!
//! Let a run open, inspect and close its own automation session. All three
//! operate on the shared [`SessionTracker`], so a session started here is
//! immediately visible to the browser-step gate.

use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{parse_params, ParamSchema, Tool, ToolHandler, ToolName};
use crate::session::{SessionStatus, SessionTracker};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SessionParams {
    /// Browser session identifier
    session_id: String,
}

struct SessionToolHandler {
    sessions: Arc<SessionTracker>,
    op: ToolName,
}

#[async_trait]
impl ToolHandler for SessionToolHandler {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        let SessionParams { session_id } = parse_params(params)?;
        if session_id.trim().is_empty() {
            return Err(ToolError::InvalidParameter("sessionId must not be empty".into()));
        }

        match self.op {
            ToolName::StartBrowserSession => {
                let session = self
                    .sessions
                    .try_start(&session_id)
                    .map_err(|e| ToolError::Rejected(e.to_string()))?;
                Ok(json!({
                    "message": format!("Browser session {} started", session_id),
                    "sessionId": session.session_id,
                    "startedAt": session.started_at.to_rfc3339(),
                }))
            }
            ToolName::GetBrowserSessionStatus => match self.sessions.get(&session_id) {
                Some(session) => Ok(json!({
                    "status": self.sessions.status(&session_id).as_str(),
                    "sessionId": session.session_id,
                    "startedAt": session.started_at.to_rfc3339(),
                    "isActive": session.is_active,
                })),
                None => Ok(json!({
                    "status": SessionStatus::NotFound.as_str(),
                    "message": format!("No session found with ID: {}", session_id),
                })),
            },
            ToolName::CloseBrowserSession => {
                let session = self
                    .sessions
                    .close(&session_id)
                    .map_err(|e| ToolError::Rejected(e.to_string()))?;
                Ok(json!({
                    "message": format!("Browser session {} closed", session_id),
                    "sessionId": session.session_id,
                    "closedAt": session.closed_at.map(|t| t.to_rfc3339()),
                }))
            }
            other => Err(ToolError::Execution(format!(
                "{} is not a browser session tool",
                other
            ))),
        }
    }
}

pub fn tools(sessions: Arc<SessionTracker>) -> Result<Vec<Tool>, EngineError> {
    let schema = ParamSchema::of::<SessionParams>()?;
    let entries = [
        (
            ToolName::StartBrowserSession,
            "Start a browser session so navigation, interaction and extraction steps can run",
        ),
        (
            ToolName::GetBrowserSessionStatus,
            "Check whether a browser session is active, inactive or unknown",
        ),
        (ToolName::CloseBrowserSession, "Close an active browser session"),
    ];

    Ok(entries
        .into_iter()
        .map(|(op, description)| {
            Tool::new(
                op,
                description,
                schema.clone(),
                Arc::new(SessionToolHandler {
                    sessions: Arc::clone(&sessions),
                    op,
                }),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn handler(sessions: &Arc<SessionTracker>, op: ToolName) -> SessionToolHandler {
        SessionToolHandler {
            sessions: Arc::clone(sessions),
            op,
        }
    }

    fn params(id: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("sessionId".into(), json!(id));
        map
    }

    #[tokio::test]
    async fn test_start_status_close() {
        let sessions = Arc::new(SessionTracker::new(Arc::new(ManualClock::starting_now())));

        let started = handler(&sessions, ToolName::StartBrowserSession)
            .call(params("s1"))
            .await
            .unwrap();
        assert_eq!(started["sessionId"], json!("s1"));
        assert!(sessions.is_active("s1"));

        let status = handler(&sessions, ToolName::GetBrowserSessionStatus)
            .call(params("s1"))
            .await
            .unwrap();
        assert_eq!(status["status"], json!("active"));

        handler(&sessions, ToolName::CloseBrowserSession)
            .call(params("s1"))
            .await
            .unwrap();
        let status = handler(&sessions, ToolName::GetBrowserSessionStatus)
            .call(params("s1"))
            .await
            .unwrap();
        assert_eq!(status["status"], json!("inactive"));
        assert_eq!(status["isActive"], json!(false));
    }

    #[tokio::test]
    async fn test_double_start_and_double_close_fail() {
        let sessions = Arc::new(SessionTracker::new(Arc::new(ManualClock::starting_now())));
        let start = handler(&sessions, ToolName::StartBrowserSession);
        let close = handler(&sessions, ToolName::CloseBrowserSession);

        start.call(params("s1")).await.unwrap();
        let err = start.call(params("s1")).await.unwrap_err();
        assert!(err.to_string().contains("already active"));

        close.call(params("s1")).await.unwrap();
        let err = close.call(params("s1")).await.unwrap_err();
        assert!(err.to_string().contains("No active browser session"));
    }

    #[tokio::test]
    async fn test_unknown_session_status() {
        let sessions = Arc::new(SessionTracker::new(Arc::new(ManualClock::starting_now())));
        let status = handler(&sessions, ToolName::GetBrowserSessionStatus)
            .call(params("ghost"))
            .await
            .unwrap();
        assert_eq!(status["status"], json!("not_found"));
    }
}
