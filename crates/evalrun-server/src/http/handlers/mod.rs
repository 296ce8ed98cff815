//! HTTP request handlers.

mod health;
mod llm_configs;
mod sessions;

pub use health::health_check;
pub use llm_configs::list_llm_configs;
pub use sessions::{
    cancel_session, delete_session, export_session, get_logs, get_results, get_status,
    list_sessions, reprocess_session, start_evaluation,
};
