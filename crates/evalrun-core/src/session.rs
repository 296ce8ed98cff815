//! Session metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, SessionId, SessionStatus};

/// Launch configuration chosen by the operator. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Tasks to evaluate, in request order without duplicates.
    pub task_ids: Vec<String>,

    /// Model configuration for the agent under test.
    pub agent_model_config: String,

    /// Model configuration for the simulated environment.
    pub environment_model_config: String,
}

impl SessionConfig {
    /// Validate and normalize a launch configuration.
    ///
    /// Task ids are trimmed, blanks dropped and duplicates removed while
    /// keeping first-seen order. An empty list is rejected.
    pub fn new(
        task_ids: impl IntoIterator<Item = impl Into<String>>,
        agent_model_config: impl Into<String>,
        environment_model_config: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let mut ordered: Vec<String> = Vec::new();
        for id in task_ids {
            let id = id.into().trim().to_string();
            if !id.is_empty() && !ordered.contains(&id) {
                ordered.push(id);
            }
        }

        if ordered.is_empty() {
            return Err(CoreError::InvalidInput("No tasks provided".to_string()));
        }

        Ok(Self {
            task_ids: ordered,
            agent_model_config: agent_model_config.into(),
            environment_model_config: environment_model_config.into(),
        })
    }

    /// Whether a task id belongs to this session.
    pub fn contains_task(&self, task_id: &str) -> bool {
        self.task_ids.iter().any(|t| t == task_id)
    }
}

/// Persisted metadata of one evaluation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,

    pub start_time: DateTime<Utc>,

    /// Set exactly once, when the session leaves `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: SessionStatus,

    pub config: SessionConfig,
}

impl Session {
    /// Create a running session.
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        Self {
            id,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Running,
            config,
        }
    }

    /// Move to a terminal status, stamping `end_time`.
    pub fn finish(&mut self, status: SessionStatus, at: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(status) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.end_time = Some(at);
        Ok(())
    }

    /// Wall-clock duration in milliseconds, zero while running.
    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::new(["t1", "t2"], "openai/gpt-4o", "ollama/llama3.2:latest").unwrap()
    }

    #[test]
    fn test_config_rejects_empty() {
        let err = SessionConfig::new(Vec::<String>::new(), "a", "b").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(SessionConfig::new(["  ", ""], "a", "b").is_err());
    }

    #[test]
    fn test_config_dedupes_in_order() {
        let config = SessionConfig::new(["b", "a", "b", " a "], "x", "y").unwrap();
        assert_eq!(config.task_ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_finish_once() {
        let mut session = Session::new(SessionId::from_millis(1), config());
        let end = Utc::now();
        session.finish(SessionStatus::Completed, end).unwrap();
        assert_eq!(session.end_time, Some(end));

        let err = session.finish(SessionStatus::Error, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.end_time, Some(end));
    }

    #[test]
    fn test_metadata_wire_format() {
        let session = Session::new(SessionId::from_millis(5), config());
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["id"], "eval-5");
        assert_eq!(value["status"], "running");
        assert_eq!(value["config"]["taskIds"][1], "t2");
        assert!(value.get("startTime").is_some());
        assert!(value.get("endTime").is_none());
    }
}
