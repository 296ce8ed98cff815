//! Destination for captured worker output.

use async_trait::async_trait;

use crate::error::SupervisorError;

/// Ordered, append-only destination for worker output.
///
/// Both output streams append to the same sink concurrently, so
/// implementations must serialize appends: a chunk is written whole or not at
/// all, never interleaved with another.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one chunk of text.
    async fn append(&self, chunk: &str) -> Result<(), SupervisorError>;
}
