//! Filesystem session store.
//!
//! Layout under the sessions directory:
//!
//! ```text
//! <sessions_dir>/
//!   eval-1718000000000/
//!     metadata.json          session metadata (camelCase)
//!     logs.txt               append-only worker log
//!     outputs/
//!       eval_<task>.json     one materialized result per task
//!       traj_<task>.json     trajectories written by the worker itself
//! ```
//!
//! Appends and metadata writes for one session are serialized through a
//! per-session lock. Readers take no lock and may observe a slightly stale
//! log tail. Metadata and result files are replaced atomically.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use evalrun_core::api::{SessionSummary, SessionSummaryStats};
use evalrun_core::{Session, SessionConfig, SessionId, SessionStatus, TaskResult};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;

const METADATA_FILE: &str = "metadata.json";
const LOG_FILE: &str = "logs.txt";
const OUTPUTS_DIR: &str = "outputs";
const RESULT_PREFIX: &str = "eval_";
const TRAJECTORY_PREFIX: &str = "traj_";

/// Attempts at finding a free id when several sessions start in the same
/// millisecond.
const MAX_ID_ATTEMPTS: usize = 64;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File stem for a task id. Anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn result_file_stem(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Durable storage of sessions, logs and task results.
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn metadata_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(METADATA_FILE)
    }

    fn log_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(LOG_FILE)
    }

    fn outputs_dir(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(OUTPUTS_DIR)
    }

    fn result_path(&self, id: &SessionId, task_id: &str) -> PathBuf {
        self.outputs_dir(id)
            .join(format!("{RESULT_PREFIX}{}.json", result_file_stem(task_id)))
    }

    async fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Forget a session's append lock unless someone is still holding it.
    async fn release_lock(&self, id: &SessionId) {
        let mut locks = self.locks.lock().await;
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether a directory exists for this session.
    pub async fn exists(&self, id: &SessionId) -> bool {
        fs::metadata(self.session_dir(id))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn ensure_exists(&self, id: &SessionId) -> Result<(), StoreError> {
        if self.exists(id).await {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    /// Allocate a new session and persist its initial metadata and empty log.
    pub async fn create_session(&self, config: SessionConfig) -> Result<Session, StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(io_error(&self.root))?;

        let mut id = SessionId::generate();
        let mut attempts = 0;
        loop {
            let dir = self.session_dir(&id);
            match fs::create_dir(&dir).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempts < MAX_ID_ATTEMPTS => {
                    debug!(session_id = %id, "Session id taken, trying the next one");
                    attempts += 1;
                    id = id.next();
                }
                Err(e) => return Err(io_error(&dir)(e)),
            }
        }

        let outputs = self.outputs_dir(&id);
        fs::create_dir(&outputs).await.map_err(io_error(&outputs))?;

        let session = Session::new(id, config);
        self.write_metadata(&session).await?;

        let log = self.log_path(&session.id);
        fs::write(&log, "").await.map_err(io_error(&log))?;

        info!(
            session_id = %session.id,
            tasks = session.config.task_ids.len(),
            "Session created"
        );
        Ok(session)
    }

    /// Read session metadata.
    pub async fn read_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        let path = self.metadata_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization { path, source })
    }

    async fn write_metadata(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.metadata_path(&session.id);
        let json = serde_json::to_vec_pretty(session).map_err(|source| {
            StoreError::Serialization {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, &json).await
    }

    /// Move a running session to a terminal status and stamp its end time.
    pub async fn update_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let lock = self.lock_for(id).await;
        let guard = lock.lock().await;

        let mut session = self.read_session(id).await?;
        session.finish(status, end_time)?;
        self.write_metadata(&session).await?;
        drop(guard);
        drop(lock);

        // Terminal sessions see no further worker output.
        self.release_lock(id).await;

        info!(session_id = %id, status = %status, "Session status updated");
        Ok(session)
    }

    /// Append text to the session log.
    pub async fn append_log(&self, id: &SessionId, text: &str) -> Result<(), StoreError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let path = self.log_path(id);
        let mut file = match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        file.write_all(text.as_bytes())
            .await
            .map_err(io_error(&path))?;
        file.flush().await.map_err(io_error(&path))?;
        Ok(())
    }

    /// Snapshot of the session log. Empty if the session exists but has no log.
    pub async fn read_log(&self, id: &SessionId) -> Result<String, StoreError> {
        let path = self.log_path(id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_exists(id).await?;
                Ok(String::new())
            }
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Write (or overwrite) the result record for one task.
    pub async fn write_task_result(
        &self,
        id: &SessionId,
        result: &TaskResult,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        self.ensure_exists(id).await?;
        let outputs = self.outputs_dir(id);
        fs::create_dir_all(&outputs)
            .await
            .map_err(io_error(&outputs))?;

        let path = self.result_path(id, &result.task_id);
        let json = serde_json::to_vec_pretty(result).map_err(|source| {
            StoreError::Serialization {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, &json).await?;

        debug!(session_id = %id, task_id = %result.task_id, "Task result written");
        Ok(())
    }

    /// All readable result records, ordered by file name. Unreadable files are
    /// skipped with a warning.
    pub async fn list_task_results(&self, id: &SessionId) -> Result<Vec<TaskResult>, StoreError> {
        let mut results = Vec::new();
        for path in self.output_files(id, RESULT_PREFIX).await? {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable result file");
                    continue;
                }
            };
            match serde_json::from_slice::<TaskResult>(&bytes) {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed result file");
                }
            }
        }
        Ok(results)
    }

    /// Number of trajectory files the worker left in the outputs directory.
    pub async fn count_trajectories(&self, id: &SessionId) -> Result<usize, StoreError> {
        Ok(self.output_files(id, TRAJECTORY_PREFIX).await?.len())
    }

    async fn output_files(&self, id: &SessionId, prefix: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.outputs_dir(id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_exists(id).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&dir)(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(prefix) && name.ends_with(".json") {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Remove a session and everything it owns.
    ///
    /// The directory is first renamed out of the way so readers never see a
    /// half-deleted session, then removed recursively.
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let lock = self.lock_for(id).await;
        {
            let _guard = lock.lock().await;
            self.ensure_exists(id).await?;

            let dir = self.session_dir(id);
            let trash = self.root.join(format!(
                ".{}.deleting-{}",
                id,
                Utc::now().timestamp_millis()
            ));
            fs::rename(&dir, &trash).await.map_err(io_error(&dir))?;
            fs::remove_dir_all(&trash)
                .await
                .map_err(io_error(&trash))?;
        }

        self.locks.lock().await.remove(id);
        info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Ids of every session on disk, newest first.
    pub async fn list_session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root)(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(&self.root))?
        {
            if let Ok(id) = SessionId::parse(&entry.file_name().to_string_lossy()) {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Summaries of every session, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut summaries = Vec::new();
        for id in self.list_session_ids().await? {
            summaries.push(self.summarize(id).await);
        }
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn summarize(&self, id: SessionId) -> SessionSummary {
        let name = format!("Evaluation Run {}", id.millis());
        match self.read_session(&id).await {
            Ok(session) => {
                let results = self.list_task_results(&id).await.unwrap_or_default();
                let trajectories = self.count_trajectories(&id).await.unwrap_or_default();
                SessionSummary {
                    name,
                    start_time: Some(session.start_time),
                    end_time: session.end_time,
                    status: session.status,
                    summary: SessionSummaryStats::from_results(
                        &results,
                        session.duration_ms(),
                        trajectories,
                    ),
                    config: Some(session.config),
                    error: None,
                    id,
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to read session data");
                SessionSummary {
                    name,
                    start_time: id.created_at(),
                    end_time: None,
                    status: SessionStatus::Error,
                    config: None,
                    summary: SessionSummaryStats::default(),
                    error: Some("Failed to read session data".to_string()),
                    id,
                }
            }
        }
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, contents).await.map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).await.map_err(io_error(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalrun_core::RawOutcome;
    use std::collections::HashSet;

    fn config() -> SessionConfig {
        SessionConfig::new(["t1", "t2"], "openai/gpt-4o", "ollama/llama3.2:latest").unwrap()
    }

    fn result(task: &str, success: bool) -> TaskResult {
        TaskResult::from_outcome(&RawOutcome::salvaged(task, success, 1.0), Utc::now())
    }

    #[tokio::test]
    async fn test_create_yields_distinct_readable_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let mut ids = HashSet::new();
        for _ in 0..5 {
            let session = store.create_session(config()).await.unwrap();
            let read = store.read_session(&session.id).await.unwrap();
            assert_eq!(read.status, SessionStatus::Running);
            assert_eq!(read.config.task_ids, vec!["t1", "t2"]);
            assert!(ids.insert(session.id));
        }
    }

    #[tokio::test]
    async fn test_log_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();

        assert_eq!(store.read_log(&session.id).await.unwrap(), "");
        store.append_log(&session.id, "line one\n").await.unwrap();
        store.append_log(&session.id, "line two\n").await.unwrap();
        assert_eq!(
            store.read_log(&session.id).await.unwrap(),
            "line one\nline two\n"
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let session = store.create_session(config()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                store.append_log(&id, &format!("chunk-{i}\n")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = store.read_log(&session.id).await.unwrap();
        assert_eq!(log.lines().count(), 20);
        for i in 0..20 {
            assert!(log.lines().any(|l| l == format!("chunk-{i}")));
        }
    }

    #[tokio::test]
    async fn test_result_overwrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();

        store.write_task_result(&session.id, &result("t1", false)).await.unwrap();
        let latest = result("t1", true);
        store.write_task_result(&session.id, &latest).await.unwrap();

        let results = store.list_task_results(&session.id).await.unwrap();
        assert_eq!(results, vec![latest]);
    }

    #[tokio::test]
    async fn test_malformed_result_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();

        store.write_task_result(&session.id, &result("t1", true)).await.unwrap();
        std::fs::write(
            dir.path().join(session.id.as_str()).join("outputs/eval_broken.json"),
            "{not json",
        )
        .unwrap();

        let results = store.list_task_results(&session.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task_id, "t1");
    }

    #[tokio::test]
    async fn test_task_id_is_sanitized_for_file_name() {
        assert_eq!(result_file_stem("safety-ssrf"), "safety-ssrf");
        assert_eq!(result_file_stem("../etc/passwd"), ".._etc_passwd");

        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();
        store.write_task_result(&session.id, &result("a/b", true)).await.unwrap();

        let results = store.list_task_results(&session.id).await.unwrap();
        assert_eq!(results[0].task_id, "a/b");
    }

    #[tokio::test]
    async fn test_update_status_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();

        let end = Utc::now();
        let updated = store
            .update_status(&session.id, SessionStatus::Completed, end)
            .await
            .unwrap();
        assert_eq!(updated.end_time, Some(end));

        let err = store
            .update_status(&session.id, SessionStatus::Error, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Core(_)));
        let read = store.read_session(&session.id).await.unwrap();
        assert_eq!(read.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_finished_sessions_release_locks() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let first = store.create_session(config()).await.unwrap();
        let second = store.create_session(config()).await.unwrap();
        store.append_log(&first.id, "a\n").await.unwrap();
        store.append_log(&second.id, "b\n").await.unwrap();
        assert_eq!(store.tracked_locks().await, 2);

        store
            .update_status(&first.id, SessionStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.tracked_locks().await, 1);

        store
            .update_status(&second.id, SessionStatus::Error, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.tracked_locks().await, 0);
        assert_eq!(store.read_log(&first.id).await.unwrap(), "a\n");
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(config()).await.unwrap();
        store.append_log(&session.id, "hello\n").await.unwrap();
        store.write_task_result(&session.id, &result("t1", true)).await.unwrap();

        store.delete_session(&session.id).await.unwrap();

        assert!(!store.exists(&session.id).await);
        assert!(store.read_session(&session.id).await.unwrap_err().is_not_found());
        assert!(store.read_log(&session.id).await.unwrap_err().is_not_found());
        assert!(store.list_task_results(&session.id).await.unwrap_err().is_not_found());
        assert!(store.append_log(&session.id, "late\n").await.unwrap_err().is_not_found());
        assert!(store.delete_session(&session.id).await.unwrap_err().is_not_found());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let first = store.create_session(config()).await.unwrap();
        let second = store.create_session(config()).await.unwrap();
        store.write_task_result(&second.id, &result("t1", true)).await.unwrap();
        store.write_task_result(&second.id, &result("t2", false)).await.unwrap();
        std::fs::create_dir(dir.path().join("eval-1")).unwrap();
        std::fs::create_dir(dir.path().join("not-a-session")).unwrap();

        let sessions = store.list_sessions().await.unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids[..2], [second.id.clone(), first.id.clone()]);
        assert_eq!(sessions.len(), 3);

        assert_eq!(sessions[0].summary.total_tasks, 2);
        assert_eq!(sessions[0].summary.average_score, 50.0);

        let broken = &sessions[2];
        assert_eq!(broken.status, SessionStatus::Error);
        assert!(broken.error.is_some());
    }
}
