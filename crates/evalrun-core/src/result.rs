//! Per-task outcomes: the raw shape recovered from worker output and the
//! canonical record materialized for each task.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Score given to a passing task. Fixed scale, independent of whatever score
/// the worker itself reports.
pub const MAX_SCORE: u32 = 100;

/// Task id used when a recovered entry carries none.
pub const UNKNOWN_TASK_ID: &str = "unknown";

/// One entry of the result array printed by the evaluation worker.
///
/// Field types are coerced leniently because the worker is an external
/// program: a missing or odd-typed field falls back to its zero value instead
/// of rejecting the whole array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OutcomeRecord")]
pub struct RawOutcome {
    pub task_name: Option<String>,
    pub success: bool,
    pub time_used: f64,
    pub agent_response: Option<String>,
    pub evaluation_result: Option<Value>,
    pub error: Option<String>,
}

/// Wire shape of an outcome. `task_name` wins over `taskName` when both are
/// present and non-empty.
#[derive(Deserialize)]
struct OutcomeRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    task_name: Option<String>,

    #[serde(default, rename = "taskName", deserialize_with = "lenient::text")]
    task_name_camel: Option<String>,

    #[serde(default, deserialize_with = "lenient::truthy")]
    success: bool,

    #[serde(default, deserialize_with = "lenient::seconds")]
    time_used: f64,

    #[serde(default, deserialize_with = "lenient::text")]
    agent_response: Option<String>,

    #[serde(default)]
    evaluation_result: Option<Value>,

    #[serde(default, deserialize_with = "lenient::text")]
    error: Option<String>,
}

impl From<OutcomeRecord> for RawOutcome {
    fn from(record: OutcomeRecord) -> Self {
        Self {
            task_name: record.task_name.or(record.task_name_camel),
            success: record.success,
            time_used: record.time_used,
            agent_response: record.agent_response,
            evaluation_result: record.evaluation_result,
            error: record.error,
        }
    }
}

impl RawOutcome {
    /// Outcome carrying only the fields the regex salvage tier can recover.
    pub fn salvaged(task_name: impl Into<String>, success: bool, time_used: f64) -> Self {
        Self {
            task_name: Some(task_name.into()),
            success,
            time_used: lenient::clamp_seconds(time_used),
            ..Self::default()
        }
    }
}

/// Canonical result record of one task within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(rename = "task_name")]
    pub task_id: String,

    pub success: bool,

    pub score: u32,

    pub max_score: u32,

    /// Elapsed seconds, never negative.
    #[serde(default)]
    pub time_used: f64,

    #[serde(default)]
    pub agent_response: String,

    #[serde(default)]
    pub evaluation_result: Option<Value>,

    #[serde(default)]
    pub error: Option<String>,

    /// When the record was materialized (not when the worker produced it).
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// Derive the canonical record from a recovered outcome.
    pub fn from_outcome(outcome: &RawOutcome, at: DateTime<Utc>) -> Self {
        let task_id = outcome
            .task_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_TASK_ID.to_string());

        Self {
            task_id,
            success: outcome.success,
            score: if outcome.success { MAX_SCORE } else { 0 },
            max_score: MAX_SCORE,
            time_used: lenient::clamp_seconds(outcome.time_used),
            agent_response: outcome.agent_response.clone().unwrap_or_default(),
            evaluation_result: outcome.evaluation_result.clone(),
            error: outcome.error.clone(),
            timestamp: at,
        }
    }

    /// Pass/fail label shown to consumers.
    pub fn label(&self) -> ResultLabel {
        if self.success {
            ResultLabel::Success
        } else {
            ResultLabel::Failure
        }
    }
}

/// Derived pass/fail label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultLabel {
    Success,
    Failure,
}

impl fmt::Display for ResultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn clamp_seconds(secs: f64) -> f64 {
        if secs.is_finite() && secs > 0.0 {
            secs
        } else {
            0.0
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    pub fn truthy<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        })
    }

    pub fn seconds<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        let secs = match Value::deserialize(de)? {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(clamp_seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_follows_success() {
        let now = Utc::now();
        let pass = TaskResult::from_outcome(&RawOutcome::salvaged("t1", true, 1.2), now);
        let fail = TaskResult::from_outcome(&RawOutcome::salvaged("t2", false, 0.5), now);

        assert_eq!((pass.score, pass.max_score), (100, 100));
        assert_eq!((fail.score, fail.max_score), (0, 100));
        assert_eq!(pass.label(), ResultLabel::Success);
        assert_eq!(fail.label(), ResultLabel::Failure);
        assert_eq!(pass.timestamp, now);
    }

    #[test]
    fn test_missing_task_name_becomes_unknown() {
        let outcome: RawOutcome = serde_json::from_value(json!({"success": true})).unwrap();
        let result = TaskResult::from_outcome(&outcome, Utc::now());
        assert_eq!(result.task_id, UNKNOWN_TASK_ID);
        assert_eq!(result.time_used, 0.0);
        assert_eq!(result.agent_response, "");
        assert!(result.evaluation_result.is_none());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_lenient_coercion() {
        let outcome: RawOutcome = serde_json::from_value(json!({
            "taskName": "t9",
            "success": 1,
            "time_used": -4.0,
            "agent_response": null,
            "evaluation_result": {"checkpoints": [1, 0]},
            "error": {"kind": "timeout"}
        }))
        .unwrap();

        assert_eq!(outcome.task_name.as_deref(), Some("t9"));
        assert!(outcome.success);
        assert_eq!(outcome.time_used, 0.0);
        assert!(outcome.agent_response.is_none());
        assert_eq!(outcome.error.as_deref(), Some(r#"{"kind":"timeout"}"#));
    }

    #[test]
    fn test_both_task_name_spellings() {
        let outcome: RawOutcome = serde_json::from_value(json!({
            "task_name": "t1",
            "taskName": "legacy",
            "success": true,
            "agent_response": "kept"
        }))
        .unwrap();
        assert_eq!(outcome.task_name.as_deref(), Some("t1"));
        assert_eq!(outcome.agent_response.as_deref(), Some("kept"));

        let outcome: RawOutcome =
            serde_json::from_value(json!({"task_name": "", "taskName": "t2"})).unwrap();
        assert_eq!(outcome.task_name.as_deref(), Some("t2"));
    }

    #[test]
    fn test_result_file_format() {
        let result = TaskResult::from_outcome(&RawOutcome::salvaged("t1", true, 2.0), Utc::now());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["task_name"], "t1");
        assert_eq!(value["max_score"], 100);
        assert_eq!(value["time_used"], 2.0);

        let back: TaskResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
