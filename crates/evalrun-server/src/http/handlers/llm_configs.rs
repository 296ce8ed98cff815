//! Model configuration handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use evalrun_core::api::LlmConfigResponse;

use crate::llm_configs::load_llm_configs;
use crate::state::AppState;

/// Named model configurations, without credentials.
pub async fn list_llm_configs(State(state): State<Arc<AppState>>) -> Json<Vec<LlmConfigResponse>> {
    let configs = load_llm_configs(state.config.models.config_path.as_deref()).await;
    Json(configs.iter().map(LlmConfigResponse::from).collect())
}
