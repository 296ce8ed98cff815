//! HTTP request and response types shared by the server and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LlmConfig, ResultLabel, Session, SessionConfig, SessionId, SessionStatus, TaskResult};

// ============================================================================
// Session creation
// ============================================================================

/// Request body for starting an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvaluationRequest {
    #[serde(default)]
    pub task_ids: Vec<String>,

    #[serde(default, alias = "agentLlmConfig")]
    pub agent_model_config: String,

    #[serde(default, alias = "envLlmConfig")]
    pub environment_model_config: String,
}

/// Response body for a started evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvaluationResponse {
    pub session_id: SessionId,
}

// ============================================================================
// Session state
// ============================================================================

/// Response body for the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl StatusResponse {
    /// Reported while metadata has not been written yet.
    pub fn pending() -> Self {
        Self {
            status: SessionStatus::Running,
            start_time: None,
            end_time: None,
        }
    }
}

impl From<&Session> for StatusResponse {
    fn from(session: &Session) -> Self {
        Self {
            status: session.status,
            start_time: Some(session.start_time),
            end_time: session.end_time,
        }
    }
}

/// One materialized result with its derived label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub task_id: String,
    pub task_name: String,
    pub status: ResultLabel,
    pub score: u32,
    pub max_score: u32,
    pub evaluation_data: TaskResult,
}

impl From<TaskResult> for ResultEntry {
    fn from(result: TaskResult) -> Self {
        Self {
            task_id: result.task_id.clone(),
            task_name: result.task_id.clone(),
            status: result.label(),
            score: result.score,
            max_score: result.max_score,
            evaluation_data: result,
        }
    }
}

/// Downloadable bundle of everything persisted for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub session_id: SessionId,
    pub metadata: Session,
    pub results: Vec<TaskResult>,
    pub logs: String,
    pub exported_at: DateTime<Utc>,
}

// ============================================================================
// Session listing
// ============================================================================

/// Counts of files found in a session's outputs directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputFileCounts {
    pub evaluations: usize,
    pub trajectories: usize,
}

/// Aggregate numbers for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryStats {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    /// Mean score rounded to one decimal.
    pub average_score: f64,
    pub total_duration_ms: i64,
    pub output_files: OutputFileCounts,
}

impl SessionSummaryStats {
    /// Compute stats from a session's materialized results.
    pub fn from_results(results: &[TaskResult], duration_ms: i64, trajectories: usize) -> Self {
        let total_tasks = results.len();
        let successful_tasks = results.iter().filter(|r| r.success).count();
        let average_score = if total_tasks > 0 {
            let total: f64 = results.iter().map(|r| f64::from(r.score)).sum();
            (total / total_tasks as f64 * 10.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            total_tasks,
            successful_tasks,
            failed_tasks: total_tasks - successful_tasks,
            average_score,
            total_duration_ms: duration_ms,
            output_files: OutputFileCounts {
                evaluations: total_tasks,
                trajectories,
            },
        }
    }
}

/// One row of the session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub config: Option<SessionConfig>,
    pub summary: SessionSummaryStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Management
// ============================================================================

/// Response body for deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Response body for a cancellation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub session_id: SessionId,
    pub cancelled: bool,
}

/// Response body for a reprocessing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessResponse {
    pub session_id: SessionId,
    /// Number of results written; zero when skipped.
    pub recovered: usize,
    pub skipped: bool,
}

/// Model configuration as exposed over HTTP. Credentials are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfigResponse {
    pub name: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub provider: String,
    pub is_local: bool,
    pub has_credential: bool,
}

impl From<&LlmConfig> for LlmConfigResponse {
    fn from(config: &LlmConfig) -> Self {
        Self {
            name: config.name.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            provider: config.provider().to_string(),
            is_local: config.is_local(),
            has_credential: config.api_key.is_some(),
        }
    }
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,

    /// Set when the session was created before the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}
