//! Evalrun Orchestrator Server Library
//!
//! Session storage, worker orchestration, result materialization and the
//! HTTP API used by the dashboard and the `evalrun` CLI.

pub mod config;
pub mod error;
pub mod http;
pub mod llm_configs;
pub mod materializer;
pub mod orchestrator;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{MaterializeError, OrchestratorError, StoreError};
pub use state::AppState;
pub use store::SessionStore;
