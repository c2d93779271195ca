//! Browser session tracking
//!
//! In-memory registry of automation session identifiers and their
//! active/inactive flag. Browser-kind steps consult it before any call to
//! the automation backend; the backend itself owns the real remote session.
//!
//! Entries are created only by an explicit start. Closing keeps the entry
//! (and its start time) so status queries can distinguish a closed session
//! from one that never existed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::clock::Clock;

/// Local view of one automation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Result of a status lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
    NotFound,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::NotFound => "not_found",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Browser session '{0}' is already active")]
    AlreadyActive(String),

    #[error("No active browser session with id '{0}'")]
    NotActive(String),
}

/// Concurrency-safe session registry
pub struct SessionTracker {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Create or reactivate a session and mark it active
    pub fn start(&self, session_id: &str) -> Session {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        let session = Session {
            session_id: session_id.to_string(),
            started_at: now,
            is_active: true,
            closed_at: None,
        };
        let previous = sessions.insert(session_id.to_string(), session.clone());

        match previous {
            Some(_) => info!("Reactivated browser session {}", session_id),
            None => info!("Started browser session {}", session_id),
        }
        session
    }

    /// Start a session, failing if it is already active
    pub fn try_start(&self, session_id: &str) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if sessions.get(session_id).is_some_and(|s| s.is_active) {
            return Err(SessionError::AlreadyActive(session_id.to_string()));
        }

        let session = Session {
            session_id: session_id.to_string(),
            started_at: now,
            is_active: true,
            closed_at: None,
        };
        sessions.insert(session_id.to_string(), session.clone());
        info!("Started browser session {}", session_id);
        Ok(session)
    }

    /// Mark a session inactive, keeping its entry
    pub fn close(&self, session_id: &str) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        match sessions.get_mut(session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                session.closed_at = Some(now);
                info!("Closed browser session {}", session_id);
                Ok(session.clone())
            }
            _ => {
                debug!("Close requested for inactive session {}", session_id);
                Err(SessionError::NotActive(session_id.to_string()))
            }
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .is_some_and(|s| s.is_active)
    }

    pub fn status(&self, session_id: &str) -> SessionStatus {
        match self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
        {
            Some(s) if s.is_active => SessionStatus::Active,
            Some(_) => SessionStatus::Inactive,
            None => SessionStatus::NotFound,
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }
}
