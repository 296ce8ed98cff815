//! HTTP server for the orchestrator.
//!
//! Provides endpoints for:
//! - Starting and listing evaluations (`/v1/evaluations`)
//! - Per-session logs, status, results, export, cancel, reprocess and delete
//!   (`/v1/evaluations/:id/...`)
//! - Model configurations (`/v1/llm-configs`)
//! - Health check (`/health`)

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod error;
mod handlers;

pub use error::ApiError;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for the dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Session routes
        .route(
            "/v1/evaluations",
            get(handlers::list_sessions).post(handlers::start_evaluation),
        )
        .route("/v1/evaluations/:id", delete(handlers::delete_session))
        .route("/v1/evaluations/:id/logs", get(handlers::get_logs))
        .route("/v1/evaluations/:id/status", get(handlers::get_status))
        .route("/v1/evaluations/:id/results", get(handlers::get_results))
        .route("/v1/evaluations/:id/export", get(handlers::export_session))
        .route("/v1/evaluations/:id/cancel", post(handlers::cancel_session))
        .route("/v1/evaluations/:id/reprocess", post(handlers::reprocess_session))
        // Configuration routes
        .route("/v1/llm-configs", get(handlers::list_llm_configs))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use evalrun_core::{SessionConfig, SessionStatus};
    use serde_json::Value;
    use std::path::Path;
    use tower::ServiceExt;

    fn test_state(dir: &Path) -> Arc<AppState> {
        let mut config = Config::default();
        config.server.sessions_dir = dir.join("sessions");
        config.worker.program = "sh".to_string();
        config.worker.venv_python = None;
        config.worker.script = dir.join("worker.sh").to_string_lossy().into_owned();
        std::fs::write(dir.join("worker.sh"), "echo hello\n").unwrap();
        AppState::new(config)
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = create_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_start_rejects_empty_task_list() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, body) = send(
            &state,
            Method::POST,
            "/v1/evaluations",
            Some(serde_json::json!({"taskIds": [], "agentLlmConfig": "gpt-4o", "envLlmConfig": "gpt-4o"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "No tasks provided");
        assert!(state.store.list_session_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_then_query_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, body) = send(
            &state,
            Method::POST,
            "/v1/evaluations",
            Some(serde_json::json!({
                "taskIds": ["t1"],
                "agentModelConfig": "ollama/gemma3:1b",
                "environmentModelConfig": "ollama/gemma3:1b"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = json(&body)["sessionId"].as_str().unwrap().to_string();
        assert!(id.starts_with("eval-"));

        let (status, _, body) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        let reported = json(&body)["status"].as_str().unwrap().to_string();
        assert!(reported == "running" || reported == "completed");
    }

    #[tokio::test]
    async fn test_status_without_metadata_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        std::fs::create_dir_all(dir.path().join("sessions/eval-123")).unwrap();

        let (status, _, body) =
            send(&state, Method::GET, "/v1/evaluations/eval-123/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "running");

        let (status, _, _) =
            send(&state, Method::GET, "/v1/evaluations/eval-456/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_results_logs_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let config = SessionConfig::new(["t1"], "a", "b").unwrap();
        let session = state.store.create_session(config).await.unwrap();
        let id = session.id.to_string();

        let (status, _, body) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/results"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!([]));

        state
            .store
            .append_log(
                &session.id,
                "Detailed Results: [{\"task_name\": \"t1\", \"success\": true}]\n",
            )
            .await
            .unwrap();
        state
            .store
            .update_status(&session.id, SessionStatus::Completed, chrono::Utc::now())
            .await
            .unwrap();
        let (status, _, body) = send(
            &state,
            Method::POST,
            &format!("/v1/evaluations/{id}/reprocess"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["recovered"], 1);

        let (_, _, body) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/results"), None).await;
        let results = json(&body);
        assert_eq!(results[0]["taskId"], "t1");
        assert_eq!(results[0]["status"], "success");
        assert_eq!(results[0]["score"], 100);

        let (status, headers, body) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/logs"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert!(String::from_utf8(body).unwrap().contains("Detailed Results:"));

        let (status, headers, body) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/export"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
            format!("attachment; filename=\"{id}-results.json\"")
        );
        let bundle = json(&body);
        assert_eq!(bundle["sessionId"], id.as_str());
        assert_eq!(bundle["metadata"]["status"], "completed");
        assert_eq!(bundle["results"][0]["task_name"], "t1");
        assert!(bundle["logs"].as_str().unwrap().contains("Detailed Results:"));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let config = SessionConfig::new(["t1"], "a", "b").unwrap();
        let session = state.store.create_session(config).await.unwrap();
        state
            .store
            .update_status(&session.id, SessionStatus::Completed, chrono::Utc::now())
            .await
            .unwrap();
        let id = session.id.to_string();

        let (status, _, _) =
            send(&state, Method::DELETE, "/v1/evaluations/not-a-session", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(&state, Method::DELETE, "/v1/evaluations/eval-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, body) =
            send(&state, Method::DELETE, &format!("/v1/evaluations/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["success"], true);

        let (status, _, _) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/status"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) =
            send(&state, Method::GET, &format!("/v1/evaluations/{id}/results"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, _) =
            send(&state, Method::POST, "/v1/evaluations/eval-5/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_llm_configs_hide_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, body) = send(&state, Method::GET, "/v1/llm-configs", None).await;
        assert_eq!(status, StatusCode::OK);

        let configs = json(&body);
        let configs = configs.as_array().unwrap();
        assert_eq!(configs.len(), 4);
        assert_eq!(configs[3]["name"], "openai/gpt-4o");
        assert_eq!(configs[3]["isLocal"], false);
        assert!(configs.iter().all(|c| c.get("apiKey").is_none()));
    }
}
