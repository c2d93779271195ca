//! LLM Provider Abstraction Layer
//!
//! The model-inference collaborator is reached through the [`LLMProvider`]
//! trait, which turns a conversation into raw text. Structured output (the
//! next step) is pulled out of that text with [`extract_json_object`], which
//! tolerates fenced blocks and prose around the JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;

pub use ollama::OllamaProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama")
    fn name(&self) -> &str;

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The raw assistant text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Pull the first JSON object out of model output.
///
/// Handles multiple output formats:
/// 1. Raw JSON: the whole content is an object
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: the first balanced `{...}` that parses
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    // Pattern 1: Raw JSON
    if let Some(v) = parse_object(trimmed) {
        return Some(v);
    }

    // Pattern 2: Extract from markdown code fences (even with trailing text)
    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(v) = parse_object(inner.trim()) {
            return Some(v);
        }
    }

    // Pattern 3: Scan each '{' for a balanced object
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(v) = parse_object(json_str) {
                return Some(v);
            }
        }
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(s).ok()?;
    value.is_object().then_some(value)
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("Plan the next step");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(Message::assistant("ok").role.to_string(), "assistant");
    }

    #[test]
    fn test_extract_raw_json() {
        let v = extract_json_object(r#"{"tool": "WAIT", "instruction": "500"}"#).unwrap();
        assert_eq!(v["tool"], json!("WAIT"));
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_text() {
        let content = "Here you go:\n```json\n{\"tool\": \"TERMINATE\"}\n```\nGood luck!";
        let v = extract_json_object(content).unwrap();
        assert_eq!(v["tool"], json!("TERMINATE"));
    }

    #[test]
    fn test_extract_embedded_json_skips_non_objects() {
        let content = r#"I think {not json} then {"tool": "OBSERVE", "instruction": "find the {search} box"} works"#;
        let v = extract_json_object(content).unwrap();
        assert_eq!(v["tool"], json!("OBSERVE"));
        assert_eq!(v["instruction"], json!("find the {search} box"));
    }

    #[test]
    fn test_extract_none_for_prose() {
        assert!(extract_json_object("I am done.").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
