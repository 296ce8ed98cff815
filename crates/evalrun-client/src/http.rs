//! HTTP client for the orchestrator REST API.

use evalrun_core::api::{
    CancelResponse, DeleteResponse, ErrorResponse, ExportBundle, LlmConfigResponse,
    ReprocessResponse, ResultEntry, SessionSummary, StartEvaluationRequest,
    StartEvaluationResponse, StatusResponse,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;

/// HTTP client for REST API endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if the server is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.url("/health");
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Start an evaluation and return its session id.
    pub async fn start_evaluation(
        &self,
        request: &StartEvaluationRequest,
    ) -> Result<StartEvaluationResponse, ClientError> {
        let url = self.url("/v1/evaluations");
        debug!(url = %url, tasks = request.task_ids.len(), "POST request");

        let response = self.inner.post(&url).json(request).send().await?;
        decode(response, "/v1/evaluations").await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError> {
        self.get_json("/v1/evaluations").await
    }

    pub async fn status(&self, session_id: &str) -> Result<StatusResponse, ClientError> {
        self.get_json(&format!("/v1/evaluations/{session_id}/status"))
            .await
    }

    pub async fn results(&self, session_id: &str) -> Result<Vec<ResultEntry>, ClientError> {
        self.get_json(&format!("/v1/evaluations/{session_id}/results"))
            .await
    }

    pub async fn export(&self, session_id: &str) -> Result<ExportBundle, ClientError> {
        self.get_json(&format!("/v1/evaluations/{session_id}/export"))
            .await
    }

    pub async fn llm_configs(&self) -> Result<Vec<LlmConfigResponse>, ClientError> {
        self.get_json("/v1/llm-configs").await
    }

    /// Current log text of a session.
    pub async fn logs(&self, session_id: &str) -> Result<String, ClientError> {
        let path = format!("/v1/evaluations/{session_id}/logs");
        let url = self.url(&path);
        debug!(url = %url, "GET request");

        let response = check(self.inner.get(&url).send().await?, &path).await?;
        Ok(response.text().await?)
    }

    pub async fn delete(&self, session_id: &str) -> Result<DeleteResponse, ClientError> {
        let path = format!("/v1/evaluations/{session_id}");
        let url = self.url(&path);
        debug!(url = %url, "DELETE request");

        let response = self.inner.delete(&url).send().await?;
        decode(response, &path).await
    }

    pub async fn cancel(&self, session_id: &str) -> Result<CancelResponse, ClientError> {
        self.post_empty(&format!("/v1/evaluations/{session_id}/cancel"))
            .await
    }

    pub async fn reprocess(
        &self,
        session_id: &str,
        force: bool,
    ) -> Result<ReprocessResponse, ClientError> {
        self.post_empty(&format!(
            "/v1/evaluations/{session_id}/reprocess?force={force}"
        ))
        .await
    }

    /// Get JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        decode(response, path).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).send().await?;
        decode(response, path).await
    }
}

/// Turn non-success responses into errors, keeping the server's message.
async fn check(response: Response, path: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("{path}: {message}")));
    }
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ClientError> {
    check(response, path)
        .await?
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}
