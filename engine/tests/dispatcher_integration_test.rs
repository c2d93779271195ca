//! Integration tests for the tool dispatcher
//!
//! Exercises the full gate chain against the built-in catalogue:
//! - Lookup and schema validation
//! - Time-windowed loop detection (driven by a manual clock)
//! - Handler failures reported as data

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use sdk::types::ErrorKind;
use waypoint_engine::clock::ManualClock;
use waypoint_engine::session::SessionTracker;
use waypoint_engine::tools::{LoopDetector, ToolContext, ToolDispatcher, ToolRegistry};

struct Harness {
    dispatcher: ToolDispatcher,
    clock: Arc<ManualClock>,
    _workspace: TempDir,
}

fn harness() -> Harness {
    let workspace = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = Arc::new(SessionTracker::new(clock.clone()));
    let ctx = ToolContext {
        workspace: workspace.path().to_path_buf(),
        sessions,
        clock: clock.clone(),
        python_bin: "python3".into(),
        python_timeout: Duration::from_secs(10),
    };
    let registry = Arc::new(ToolRegistry::with_defaults(&ctx).unwrap());
    let detector = Arc::new(LoopDetector::new(
        chrono::Duration::milliseconds(5000),
        chrono::Duration::milliseconds(60000),
        3,
    ));
    let dispatcher = ToolDispatcher::new(registry, detector, clock.clone(), Duration::from_secs(5));

    Harness {
        dispatcher,
        clock,
        _workspace: workspace,
    }
}

#[tokio::test]
async fn test_calculate_success() {
    let h = harness();
    let result = h
        .dispatcher
        .dispatch("calculate", &json!({ "expression": "2+3*4" }))
        .await;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.payload.unwrap()["result"], json!(14));
}

#[tokio::test]
async fn test_third_identical_call_is_blocked() {
    let h = harness();
    let params = json!({ "expression": "2+3*4" });

    let first = h.dispatcher.dispatch("calculate", &params).await;
    h.clock.advance_ms(1000);
    let second = h.dispatcher.dispatch("calculate", &params).await;
    h.clock.advance_ms(1000);
    let third = h.dispatcher.dispatch("calculate", &params).await;

    assert!(first.success);
    assert!(second.success);
    assert!(third.is_kind(ErrorKind::LoopDetected));
    assert!(third.loop_detected);
    assert!(third.error.unwrap().contains("infinite loop"));
    assert_eq!(third.details.unwrap()["identicalCalls"], json!(3));
}

#[tokio::test]
async fn test_different_params_do_not_count_together() {
    let h = harness();
    let first = json!({ "expression": "2+3*4" });
    let other = json!({ "expression": "3+3*4" });

    let a = h.dispatcher.dispatch("calculate", &first).await;
    let b = h.dispatcher.dispatch("calculate", &other).await;
    let c = h.dispatcher.dispatch("calculate", &first).await;

    assert!(a.success);
    assert_eq!(b.payload.unwrap()["result"], json!(15));
    assert!(c.success, "{:?}", c);
}

#[tokio::test]
async fn test_paced_alternation_never_blocked() {
    let h = harness();
    for i in 0..20 {
        let expr = if i % 2 == 0 { "1+1" } else { "2+2" };
        let result = h
            .dispatcher
            .dispatch("calculate", &json!({ "expression": expr }))
            .await;
        assert!(result.success, "call {} was blocked: {:?}", i, result);
        h.clock.advance_ms(2600);
    }
}

#[tokio::test]
async fn test_key_order_does_not_evade_detection() {
    let h = harness();
    let a = json!({ "answer": "42", "title": "Result" });
    let b = json!({ "title": "Result", "answer": "42" });

    assert!(h.dispatcher.dispatch("format_final_answer", &a).await.success);
    assert!(h.dispatcher.dispatch("format_final_answer", &b).await.success);
    let third = h.dispatcher.dispatch("format_final_answer", &a).await;
    assert!(third.is_kind(ErrorKind::LoopDetected));
}

#[tokio::test]
async fn test_repeat_after_window_is_allowed() {
    let h = harness();
    let params = json!({ "expression": "7*6" });

    assert!(h.dispatcher.dispatch("calculate", &params).await.success);
    assert!(h.dispatcher.dispatch("calculate", &params).await.success);

    h.clock.advance_ms(6000);
    let later = h.dispatcher.dispatch("calculate", &params).await;
    assert!(later.success, "{:?}", later);
}

#[tokio::test]
async fn test_history_is_pruned_after_max_age() {
    let h = harness();
    for i in 0..5 {
        h.dispatcher
            .dispatch("calculate", &json!({ "expression": format!("{}+1", i) }))
            .await;
    }
    assert_eq!(h.dispatcher.detector().len(), 5);

    h.clock.advance_ms(60_001);
    h.dispatcher
        .dispatch("calculate", &json!({ "expression": "1" }))
        .await;
    assert_eq!(h.dispatcher.detector().len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_lists_available() {
    let h = harness();
    let result = h.dispatcher.dispatch("search_web", &json!({})).await;

    assert!(result.is_kind(ErrorKind::ToolNotFound));
    let details = result.details.unwrap();
    let available = details["availableTools"].as_array().unwrap();
    assert_eq!(available.len(), 15);
    assert!(available.contains(&json!("calculate")));
}

#[tokio::test]
async fn test_invalid_params_name_offending_fields() {
    let h = harness();
    let result = h
        .dispatcher
        .dispatch("create_file", &json!({ "path": 3, "bogus": true }))
        .await;

    assert!(result.is_kind(ErrorKind::ParameterValidationError));
    let fields = result.details.unwrap()["fields"].clone();
    let fields: Vec<String> = serde_json::from_value(fields).unwrap();
    assert!(fields.contains(&"path".to_string()));
    assert!(fields.contains(&"content".to_string()));
    assert!(fields.contains(&"bogus".to_string()));
}

#[tokio::test]
async fn test_handler_error_is_reported_not_raised() {
    let h = harness();
    let result = h
        .dispatcher
        .dispatch("read_file", &json!({ "path": "missing.txt" }))
        .await;

    assert!(result.is_kind(ErrorKind::ToolExecutionError));
    assert_eq!(result.details.unwrap()["errorType"], json!("FileNotFoundError"));
}

#[tokio::test]
async fn test_file_round_trip_through_dispatcher() {
    let h = harness();
    let created = h
        .dispatcher
        .dispatch(
            "create_file",
            &json!({ "path": "notes.txt", "content": "hello" }),
        )
        .await;
    assert!(created.success, "{:?}", created);

    let read = h
        .dispatcher
        .dispatch("read_file", &json!({ "path": "notes.txt" }))
        .await;
    assert!(read.success, "{:?}", read);
    assert_eq!(read.payload.unwrap()["content"], json!("hello"));
}

#[tokio::test]
async fn test_deeply_nested_expression_fails_cleanly() {
    let h = harness();
    let nested = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let result = h
        .dispatcher
        .dispatch("calculate", &json!({ "expression": nested }))
        .await;

    assert!(result.is_kind(ErrorKind::ToolExecutionError));
    assert!(result.error.unwrap().contains("limit is 4096"));

    let bounded = format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000));
    let result = h
        .dispatcher
        .dispatch("calculate", &json!({ "expression": bounded }))
        .await;
    assert!(result.is_kind(ErrorKind::ToolExecutionError));
    assert!(result.error.unwrap().contains("nests deeper than 256"));
}
