//! Tool dispatcher
//!
//! Single entry point from model output to tool handlers. A dispatch runs
//! four gates in order:
//!
//! 1. name lookup (`ToolNotFound`, with the list of known tools)
//! 2. schema validation (`ParameterValidationError`, with offending fields)
//! 3. loop gate (`LoopDetected`, handler not invoked)
//! 4. handler invocation under a deadline (`ToolExecutionError` on error,
//!    panic or timeout)
//!
//! Every attempt is logged with the loop detector, whichever gate stops it.
//! Nothing is raised past this boundary.

use chrono::{DateTime, Utc};
use sdk::types::{ErrorKind, ExecutionResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{LoopDetector, LoopVerdict, ToolRegistry};
use crate::clock::Clock;

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    detector: Arc<LoopDetector>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        detector: Arc<LoopDetector>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            detector,
            clock,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn detector(&self) -> &LoopDetector {
        &self.detector
    }

    /// Dispatch one tool call by wire name
    pub async fn dispatch(&self, name: &str, raw_params: &Value) -> ExecutionResult {
        debug!("Dispatching tool '{}' with params: {}", name, raw_params);
        let now = self.clock.now();

        let Some(tool) = self.registry.lookup(name) else {
            self.detector.record(name, raw_params, now);
            warn!("Unknown tool requested: {}", name);
            let available = self.registry.names();
            return ExecutionResult::failure(
                ErrorKind::ToolNotFound,
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    name,
                    available.join(", ")
                ),
            )
            .with_details(json!({ "availableTools": available }));
        };

        let params = match tool.schema.validate(raw_params) {
            Ok(params) => params,
            Err(fields) => {
                self.detector.record(name, raw_params, now);
                warn!("Invalid parameters for '{}': {}", name, fields.join(", "));
                return ExecutionResult::failure(
                    ErrorKind::ParameterValidationError,
                    format!(
                        "Invalid parameters for '{}': {}",
                        name,
                        fields.join(", ")
                    ),
                )
                .with_details(json!({
                    "fields": fields,
                    "schema": tool.schema.to_json_schema(),
                }));
            }
        };

        let validated = Value::Object(params.clone());
        if let Some(identical_calls) = self.loop_gate(name, &validated, now) {
            return ExecutionResult::failure(
                ErrorKind::LoopDetected,
                format!(
                    "Tool '{}' was called {} times with identical parameters within {}ms. \
                     This looks like an infinite loop; try a different approach or different parameters.",
                    name,
                    identical_calls,
                    self.detector.window().num_milliseconds()
                ),
            )
            .with_details(json!({
                "tool": name,
                "identicalCalls": identical_calls,
                "windowMs": self.detector.window().num_milliseconds(),
            }));
        }

        let handler = tool.handler();
        let task = tokio::spawn(async move { handler.call(params).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(payload))) => {
                info!("Tool '{}' succeeded", name);
                ExecutionResult::success(payload)
            }
            Ok(Ok(Err(e))) => {
                warn!("Tool '{}' failed: {}", name, e);
                ExecutionResult::failure(ErrorKind::ToolExecutionError, e.to_string())
                    .with_details(json!({ "errorType": e.error_type() }))
            }
            Ok(Err(e)) => {
                warn!("Tool '{}' task panicked: {}", name, e);
                ExecutionResult::failure(
                    ErrorKind::ToolExecutionError,
                    format!("Tool '{}' panicked during execution", name),
                )
            }
            Err(_) => {
                abort.abort();
                let err_msg = format!(
                    "Tool '{}' timed out after {} seconds",
                    name,
                    self.timeout.as_secs_f64()
                );
                warn!("{}", err_msg);
                ExecutionResult::failure(ErrorKind::ToolExecutionError, err_msg)
                    .with_details(json!({ "errorType": "TimeoutError" }))
            }
        }
    }

    fn loop_gate(&self, name: &str, params: &Value, now: DateTime<Utc>) -> Option<usize> {
        match self.detector.should_block(name, params, now) {
            LoopVerdict::Blocked { identical_calls } => Some(identical_calls),
            LoopVerdict::Allowed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LoopDetectionConfig;
    use crate::tools::{ParamSchema, Tool, ToolHandler, ToolName};
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use sdk::types::ToolError;
    use serde::Deserialize;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    #[allow(dead_code)]
    struct TestParams {
        mode: Option<String>,
        n: Option<i64>,
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolHandler for Counting {
        async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match params.get("mode").and_then(|v| v.as_str()) {
                Some("fail") => Err(ToolError::Execution("asked to fail".into())),
                Some("panic") => panic!("handler blew up"),
                Some("hang") => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(json!("late"))
                }
                _ => Ok(json!({ "ok": true })),
            }
        }
    }

    fn setup() -> (Arc<Counting>, Arc<ManualClock>, ToolDispatcher) {
        let handler = Arc::new(Counting::default());
        let mut registry = ToolRegistry::empty();
        registry
            .register(Tool::new(
                ToolName::Calculate,
                "test tool",
                ParamSchema::of::<TestParams>().unwrap(),
                handler.clone(),
            ))
            .unwrap();

        let clock = Arc::new(ManualClock::starting_now());
        let dispatcher = ToolDispatcher::new(
            Arc::new(registry),
            Arc::new(LoopDetector::from_config(&LoopDetectionConfig::default())),
            clock.clone(),
            Duration::from_millis(200),
        );
        (handler, clock, dispatcher)
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (handler, _, dispatcher) = setup();
        let result = dispatcher.dispatch("teleport", &json!({})).await;

        assert!(result.is_kind(ErrorKind::ToolNotFound));
        assert_eq!(result.details.unwrap()["availableTools"], json!(["calculate"]));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.detector().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_names_fields() {
        let (handler, _, dispatcher) = setup();
        let result = dispatcher
            .dispatch("calculate", &json!({ "n": "seven", "bogus": 1 }))
            .await;

        assert!(result.is_kind(ErrorKind::ParameterValidationError));
        assert_eq!(result.details.unwrap()["fields"], json!(["bogus", "n"]));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_gate_skips_handler() {
        let (handler, clock, dispatcher) = setup();
        let params = json!({ "n": 1 });

        assert!(dispatcher.dispatch("calculate", &params).await.success);
        clock.advance_ms(10);
        assert!(dispatcher.dispatch("calculate", &params).await.success);
        clock.advance_ms(10);
        let third = dispatcher.dispatch("calculate", &params).await;

        assert!(third.is_kind(ErrorKind::LoopDetected));
        assert!(third.loop_detected);
        assert!(third.error.unwrap().contains("infinite loop"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_error_is_normalized() {
        let (_, _, dispatcher) = setup();
        let result = dispatcher.dispatch("calculate", &json!({ "mode": "fail" })).await;

        assert!(result.is_kind(ErrorKind::ToolExecutionError));
        assert_eq!(result.error.as_deref(), Some("Execution failed: asked to fail"));
        assert_eq!(result.details.unwrap()["errorType"], json!("ExecutionError"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (_, _, dispatcher) = setup();
        let result = dispatcher.dispatch("calculate", &json!({ "mode": "panic" })).await;

        assert!(result.is_kind(ErrorKind::ToolExecutionError));
        assert!(result.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_handler_timeout_is_reported() {
        let (_, _, dispatcher) = setup();
        let result = dispatcher.dispatch("calculate", &json!({ "mode": "hang" })).await;

        assert!(result.is_kind(ErrorKind::ToolExecutionError));
        assert!(result.error.unwrap().contains("timed out"));
    }
}
