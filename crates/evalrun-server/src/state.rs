//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use evalrun_core::SessionId;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::store::SessionStore;

/// Handle to a worker that is still being supervised.
#[derive(Debug, Clone, Default)]
pub struct LiveWorker {
    /// Cancelled to kill the worker.
    pub cancel: CancellationToken,

    /// Cancelled by the supervision task once status has been written.
    pub finished: CancellationToken,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,

    pub store: Arc<SessionStore>,

    /// Workers currently running, indexed by session.
    pub live: RwLock<HashMap<SessionId, LiveWorker>>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(config: Config) -> Arc<Self> {
        let store = Arc::new(SessionStore::new(config.server.sessions_dir.clone()));
        Arc::new(Self {
            config,
            store,
            live: RwLock::new(HashMap::new()),
        })
    }

    /// Number of workers being supervised.
    pub async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn live_worker(&self, id: &SessionId) -> Option<LiveWorker> {
        self.live.read().await.get(id).cloned()
    }
}
