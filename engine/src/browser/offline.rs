//! Offline automation backend
//!
//! Degraded mode used when no remote backend is configured (or for
//! `mock-`/`fallback-` sessions). Returns synthetic payloads shaped like the
//! real backend's so the loop behaves identically.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_wait_ms, AutomationError, BrowserAutomation, BrowserPrimitive, OFFLINE_MAX_WAIT};

#[derive(Debug, Default, Clone)]
pub struct OfflineAutomation;

impl OfflineAutomation {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserAutomation for OfflineAutomation {
    fn mode(&self) -> &'static str {
        "offline"
    }

    async fn execute(
        &self,
        session_id: &str,
        primitive: BrowserPrimitive,
        instruction: &str,
    ) -> Result<Value, AutomationError> {
        debug!("Offline {} on {}: {}", primitive, session_id, instruction);

        let payload = match primitive {
            BrowserPrimitive::Navigate => json!({
                "message": format!("Navigated to {}", instruction),
                "url": instruction,
            }),
            BrowserPrimitive::Interact => json!({
                "message": format!("Performed action: {}", instruction),
            }),
            BrowserPrimitive::Extract => json!({
                "data": format!("Extracted information from page about: {}", instruction),
                "mockData": true,
            }),
            BrowserPrimitive::Observe => json!([{
                "id": 1,
                "selector": "body",
                "description": format!("Mock observation: {}", instruction),
                "action": "click",
            }]),
            BrowserPrimitive::Wait => {
                let requested = parse_wait_ms(instruction)?;
                let waited = requested.min(OFFLINE_MAX_WAIT.as_millis() as u64);
                tokio::time::sleep(std::time::Duration::from_millis(waited)).await;
                json!({ "waitedMs": waited, "requestedMs": requested })
            }
            BrowserPrimitive::NavigateBack => json!({ "message": "Navigated back" }),
        };

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_payloads() {
        let offline = OfflineAutomation::new();

        let nav = offline
            .execute("s", BrowserPrimitive::Navigate, "https://example.com")
            .await
            .unwrap();
        assert_eq!(nav["url"], json!("https://example.com"));

        let observed = offline
            .execute("s", BrowserPrimitive::Observe, "buttons")
            .await
            .unwrap();
        assert_eq!(observed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_is_capped() {
        let offline = OfflineAutomation::new();
        let start = tokio::time::Instant::now();

        let waited = offline
            .execute("s", BrowserPrimitive::Wait, "30000")
            .await
            .unwrap();

        assert_eq!(waited["waitedMs"], json!(1000));
        assert_eq!(waited["requestedMs"], json!(30000));
        assert!(start.elapsed() >= std::time::Duration::from_millis(1000));
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_bad_wait_instruction() {
        let offline = OfflineAutomation::new();
        let err = offline
            .execute("s", BrowserPrimitive::Wait, "a while")
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::InvalidInstruction { .. }));
    }
}
