//! Evalrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Filesystem storage
//! - Process management
//!
//! All types here represent the business domain of an evaluation session:
//! its identity, lifecycle, per-task results, model resolution and the
//! completion rule used by polling consumers.

pub mod api;
pub mod consensus;
pub mod error;
pub mod ids;
pub mod model;
pub mod result;
pub mod session;
pub mod status;

// Re-export commonly used types
pub use consensus::{CompletionSignals, Verdict};
pub use error::CoreError;
pub use ids::SessionId;
pub use model::{LlmConfig, Provider, ProviderHints, ResolvedModel};
pub use result::{RawOutcome, ResultLabel, TaskResult};
pub use session::{Session, SessionConfig};
pub use status::{SessionOutcome, SessionStatus};
