//! Utility tools: current time, arithmetic, final-answer formatting

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, Timelike, Utc};
use chrono_tz::Tz;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::calculator;
use super::{parse_params, ParamSchema, Tool, ToolHandler, ToolName};
use crate::clock::Clock;

/// A resolved timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    /// IANA zone such as `Asia/Tokyo`, daylight saving aware
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    /// Wall-clock time and UTC offset at `now`
    pub fn localize(&self, now: DateTime<Utc>) -> (NaiveDateTime, FixedOffset) {
        match self {
            Zone::Named(tz) => {
                let local = now.with_timezone(tz);
                (local.naive_local(), local.offset().fix())
            }
            Zone::Fixed(offset) => (now.with_timezone(offset).naive_local(), *offset),
        }
    }
}

/// Parse an IANA zone name, `UTC`/`Z`/`GMT`, or a fixed `+HH:MM` / `-HH:MM` offset
pub fn parse_timezone(tz: &str) -> Result<Zone, ToolError> {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") || tz.eq_ignore_ascii_case("gmt") {
        return Ok(Zone::Named(Tz::UTC));
    }
    if let Ok(named) = tz.parse::<Tz>() {
        return Ok(Zone::Named(named));
    }

    let invalid = || {
        ToolError::InvalidParameter(format!(
            "Unsupported timezone '{}'. Use an IANA name like Asia/Tokyo or an offset like +09:00",
            tz
        ))
    };

    let (sign, rest) = match tz.chars().next() {
        Some('+') => (1, &tz[1..]),
        Some('-') => (-1, &tz[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(Zone::Fixed)
        .ok_or_else(invalid)
}

fn utc() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct TimeParams {
    /// IANA zone such as Asia/Tokyo, UTC, or a fixed offset such as +09:00
    #[serde(default = "utc")]
    timezone: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CalculateParams {
    /// Expression such as 1000 * (1 + 0.05) ^ 10
    expression: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct FinalAnswerParams {
    /// Final answer content
    answer: String,
    /// Optional short title
    title: Option<String>,
}

/// Render the final answer shown to the user
pub fn format_final_answer(answer: &str, title: Option<&str>) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("## {}\n\n{}", title, answer),
        None => answer.to_string(),
    }
}

struct UtilityHandler {
    clock: Arc<dyn Clock>,
    op: ToolName,
}

#[async_trait]
impl ToolHandler for UtilityHandler {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        match self.op {
            ToolName::GetCurrentTime => {
                let TimeParams { timezone } = parse_params(params)?;
                let zone = parse_timezone(&timezone)?;
                let now = self.clock.now();
                let (local, offset) = zone.localize(now);

                Ok(json!({
                    "timestamp": now.to_rfc3339(),
                    "formatted": local.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "timezone": timezone,
                    "utcOffset": offset.to_string(),
                    "unix": now.timestamp(),
                    "currentDateTime": {
                        "year": local.year(),
                        "month": local.month(),
                        "day": local.day(),
                        "hour": local.hour(),
                        "minute": local.minute(),
                        "second": local.second(),
                        "weekday": local.format("%A").to_string(),
                    },
                }))
            }
            ToolName::Calculate => {
                let CalculateParams { expression } = parse_params(params)?;
                let value = calculator::evaluate(&expression).map_err(|e| {
                    ToolError::Execution(format!("{} in '{}'", e, preview(&expression)))
                })?;
                Ok(json!({
                    "expression": expression,
                    "result": calculator::to_json_number(value),
                }))
            }
            ToolName::FormatFinalAnswer => {
                let FinalAnswerParams { answer, title } = parse_params(params)?;
                let formatted = format_final_answer(&answer, title.as_deref());
                Ok(json!({ "formattedAnswer": formatted }))
            }
            other => Err(ToolError::Execution(format!(
                "{} is not a utility tool",
                other
            ))),
        }
    }
}

/// First 80 characters of an expression, for error messages
fn preview(expression: &str) -> String {
    const MAX_CHARS: usize = 80;
    match expression.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &expression[..idx]),
        None => expression.to_string(),
    }
}

pub fn tools(clock: Arc<dyn Clock>) -> Result<Vec<Tool>, EngineError> {
    let handler = |op: ToolName| -> Arc<dyn ToolHandler> {
        Arc::new(UtilityHandler {
            clock: Arc::clone(&clock),
            op,
        })
    };

    Ok(vec![
        Tool::new(
            ToolName::GetCurrentTime,
            "Get the current date and time",
            ParamSchema::of::<TimeParams>()?,
            handler(ToolName::GetCurrentTime),
        ),
        Tool::new(
            ToolName::Calculate,
            "Evaluate an arithmetic expression (+ - * / ^ and parentheses)",
            ParamSchema::of::<CalculateParams>()?,
            handler(ToolName::Calculate),
        ),
        Tool::new(
            ToolName::FormatFinalAnswer,
            "Format the final answer shown to the user. Always enabled.",
            ParamSchema::of::<FinalAnswerParams>()?,
            handler(ToolName::FormatFinalAnswer),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn tool(op: ToolName, clock: Arc<dyn Clock>) -> Tool {
        tools(clock).unwrap().into_iter().find(|t| t.name == op).unwrap()
    }

    async fn run(tool: &Tool, params: Value) -> Result<Value, ToolError> {
        let params = tool.schema.validate(&params).unwrap();
        tool.handler().call(params).await
    }

    fn offset_secs(tz: &str, at: DateTime<Utc>) -> i32 {
        parse_timezone(tz).unwrap().localize(at).1.local_minus_utc()
    }

    #[test]
    fn test_parse_timezone() {
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(offset_secs("UTC", winter), 0);
        assert_eq!(offset_secs("+09:00", winter), 9 * 3600);
        assert_eq!(offset_secs("-05:30", winter), -(5 * 3600 + 1800));
        assert_eq!(offset_secs("Asia/Tokyo", winter), 9 * 3600);
        assert_eq!(
            parse_timezone("Asia/Tokyo").unwrap(),
            Zone::Named(chrono_tz::Asia::Tokyo)
        );
        assert!(parse_timezone("+25:00").is_err());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(offset_secs("America/New_York", winter), -5 * 3600);
        assert_eq!(offset_secs("America/New_York", summer), -4 * 3600);
    }

    #[tokio::test]
    async fn test_current_time_uses_clock() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start));
        let time = tool(ToolName::GetCurrentTime, clock);

        let utc = run(&time, json!({})).await.unwrap();
        assert_eq!(utc["formatted"], json!("2024-03-01 23:30:00"));
        assert_eq!(utc["timezone"], json!("UTC"));

        let tokyo = run(&time, json!({ "timezone": "Asia/Tokyo" })).await.unwrap();
        assert_eq!(tokyo["currentDateTime"]["day"], json!(2));
        assert_eq!(tokyo["formatted"], json!("2024-03-02 08:30:00"));
        assert_eq!(tokyo["utcOffset"], json!("+09:00"));
        assert_eq!(tokyo["unix"], utc["unix"]);

        let fixed = run(&time, json!({ "timezone": "+09:00" })).await.unwrap();
        assert_eq!(fixed["formatted"], tokyo["formatted"]);

        let err = run(&time, json!({ "timezone": "Mars/Olympus" })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_calculate_returns_integer() {
        let calc = tool(ToolName::Calculate, Arc::new(ManualClock::starting_now()));
        let result = run(&calc, json!({ "expression": "2+3*4" })).await.unwrap();
        assert_eq!(result["result"], json!(14));

        let err = run(&calc, json!({ "expression": "2/0" })).await.unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
    }

    #[tokio::test]
    async fn test_format_final_answer() {
        let fmt = tool(ToolName::FormatFinalAnswer, Arc::new(ManualClock::starting_now()));
        let titled = run(&fmt, json!({ "answer": "42", "title": "Result" })).await.unwrap();
        assert_eq!(titled["formattedAnswer"], json!("## Result\n\n42"));

        let plain = run(&fmt, json!({ "answer": "42" })).await.unwrap();
        assert_eq!(plain["formattedAnswer"], json!("42"));
    }
}
