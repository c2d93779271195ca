//! Remote automation backend
//!
//! Talks to an HTTP automation service. Each primitive is a
//! `POST {base_url}/sessions/{session_id}/actions` with a JSON body
//! `{"primitive": ..., "instruction": ...}`; the response body is the payload.
//! WAIT is served locally and never leaves the process.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{parse_wait_ms, AutomationError, BrowserAutomation, BrowserPrimitive};

#[derive(Debug, Clone)]
pub struct RemoteAutomation {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    primitive: BrowserPrimitive,
    instruction: &'a str,
}

impl RemoteAutomation {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AutomationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            client,
        })
    }

    fn action_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}/actions", self.base_url, session_id)
    }
}

#[async_trait]
impl BrowserAutomation for RemoteAutomation {
    fn mode(&self) -> &'static str {
        "remote"
    }

    async fn execute(
        &self,
        session_id: &str,
        primitive: BrowserPrimitive,
        instruction: &str,
    ) -> Result<Value, AutomationError> {
        if primitive == BrowserPrimitive::Wait {
            let requested = parse_wait_ms(instruction)?;
            let waited = requested.min(self.timeout.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(waited)).await;
            return Ok(json!({ "waitedMs": waited, "requestedMs": requested }));
        }

        let url = self.action_url(session_id);
        debug!("Automation request: {} {}", primitive, url);

        let mut request = self.client.post(&url).json(&ActionRequest {
            primitive,
            instruction,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let start = std::time::Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AutomationError::Timeout
            } else if e.is_connect() {
                AutomationError::Unavailable(format!(
                    "Cannot connect to automation backend at {}",
                    self.base_url
                ))
            } else {
                AutomationError::Unavailable(e.to_string())
            }
        })?;

        info!(
            "Automation {} answered in {:.1}s",
            primitive,
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AutomationError::Status { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AutomationError::Parse(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(json!({ "message": format!("{} completed", primitive) }));
        }
        serde_json::from_str(&body).map_err(|e| AutomationError::Parse(e.to_string()))
    }
}
