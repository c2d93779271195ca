//! Call-history loop detection
//!
//! Tracks recent tool calls as (tool, normalized parameters, timestamp)
//! records and blocks a call once the same pair has been seen too often
//! inside a short window. Two horizons apply:
//!
//! - **window**: identical calls newer than this count toward a block
//! - **max age**: records older than this are pruned on every evaluation
//!
//! Identity is the exact pair. Different parameters on the same tool, or the
//! same parameters on another tool, never count toward each other.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::config::LoopDetectionConfig;

/// One logged dispatch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub normalized_params: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a loop evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    Allowed,
    /// Identical calls inside the window, including the one being judged
    Blocked { identical_calls: usize },
}

impl LoopVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, LoopVerdict::Blocked { .. })
    }
}

/// Time-windowed duplicate-call detector
///
/// Shared between concurrent runs; history sits behind a mutex.
#[derive(Debug)]
pub struct LoopDetector {
    history: Mutex<Vec<ToolCallRecord>>,
    window: Duration,
    max_age: Duration,
    max_identical: usize,
}

impl LoopDetector {
    pub fn new(window: Duration, max_age: Duration, max_identical: usize) -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            window,
            max_age,
            max_identical,
        }
    }

    pub fn from_config(config: &LoopDetectionConfig) -> Self {
        Self::new(
            Duration::milliseconds(config.window_ms as i64),
            Duration::milliseconds(config.max_history_age_ms as i64),
            config.max_identical_calls,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_identical(&self) -> usize {
        self.max_identical
    }

    /// Judge a call and log it.
    ///
    /// Prunes expired records, counts identical records inside the window,
    /// then appends the current call whatever the verdict. The call is
    /// blocked when the count including itself reaches the threshold.
    pub fn should_block(&self, tool: &str, params: &Value, now: DateTime<Utc>) -> LoopVerdict {
        let normalized = normalize_params(params);
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        self.prune(&mut history, now);

        let prior = history
            .iter()
            .filter(|r| {
                r.tool_name == tool
                    && r.normalized_params == normalized
                    && now - r.timestamp <= self.window
            })
            .count();

        history.push(ToolCallRecord {
            tool_name: tool.to_string(),
            normalized_params: normalized,
            timestamp: now,
        });

        let identical_calls = prior + 1;
        if identical_calls >= self.max_identical {
            warn!(
                "Loop detected: '{}' called {} times with identical parameters within {}ms",
                tool,
                identical_calls,
                self.window.num_milliseconds()
            );
            LoopVerdict::Blocked { identical_calls }
        } else {
            debug!(
                "Loop check passed for '{}' ({}/{})",
                tool, identical_calls, self.max_identical
            );
            LoopVerdict::Allowed
        }
    }

    /// Log an attempt that never reached evaluation (unknown tool, bad params)
    pub fn record(&self, tool: &str, params: &Value, now: DateTime<Utc>) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut history, now);
        history.push(ToolCallRecord {
            tool_name: tool.to_string(),
            normalized_params: normalize_params(params),
            timestamp: now,
        });
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> Vec<ToolCallRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, history: &mut Vec<ToolCallRecord>, now: DateTime<Utc>) {
        let before = history.len();
        history.retain(|r| now - r.timestamp <= self.max_age);
        let removed = before - history.len();
        if removed > 0 {
            debug!("Pruned {} expired tool call records", removed);
        }
    }
}

/// Stable, key-order-independent serialization of tool parameters.
///
/// Object keys are sorted at every depth; array order is preserved.
pub fn normalize_params(params: &Value) -> String {
    let mut out = String::new();
    write_canonical(params, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
