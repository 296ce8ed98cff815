//! Supervision of a spawned worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SupervisorError;
use crate::sink::LogSink;

const CHUNK_SIZE: usize = 8 * 1024;

/// How long to keep draining after exit. Grandchildren that inherited the
/// pipes can keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// How the worker finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` if killed by a signal.
    pub exit_code: Option<i32>,

    /// The worker was killed through the cancellation token.
    pub cancelled: bool,

    /// Time from spawn to exit.
    pub elapsed: Duration,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A spawned worker whose output has not been consumed yet.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    started: Instant,
}

impl WorkerProcess {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            child,
            started: Instant::now(),
        }
    }

    /// OS process id, while the process is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Drain stdout and stderr into `sink` until the worker exits.
    ///
    /// The two streams are read concurrently; each is appended in order but
    /// there is no ordering between them. Cancelling the token kills the worker
    /// and then proceeds exactly like a normal exit.
    pub async fn supervise(
        mut self,
        sink: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> Result<ExitReport, SupervisorError> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or(SupervisorError::StreamUnavailable("stdout"))?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or(SupervisorError::StreamUnavailable("stderr"))?;

        let stdout_task = tokio::spawn(drain("stdout", stdout, sink.clone()));
        let stderr_task = tokio::spawn(drain("stderr", stderr, sink));

        let mut cancelled = false;
        let status = tokio::select! {
            status = self.child.wait() => status,
            _ = cancel.cancelled() => {
                cancelled = true;
                warn!(pid = ?self.child.id(), "Cancellation requested, killing worker");
                if let Err(e) = self.child.start_kill() {
                    warn!(error = %e, "Failed to signal worker");
                }
                self.child.wait().await
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Error waiting for worker");
                stdout_task.abort();
                stderr_task.abort();
                return Err(SupervisorError::Wait(e));
            }
        };

        for (name, task) in [("stdout", stdout_task), ("stderr", stderr_task)] {
            finish_drain(name, task).await;
        }

        let report = ExitReport {
            exit_code: status.code(),
            cancelled,
            elapsed: self.started.elapsed(),
        };
        info!(
            exit_code = ?report.exit_code,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Worker exited"
        );
        Ok(report)
    }
}

async fn finish_drain(name: &'static str, mut task: JoinHandle<u64>) {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(bytes)) => debug!(stream = name, bytes, "Stream drained"),
        Ok(Err(e)) => warn!(stream = name, error = %e, "Drain task failed"),
        Err(_) => {
            warn!(stream = name, "Stream still open after worker exit, abandoning");
            task.abort();
        }
    }
}

/// Copy one stream into the sink chunk by chunk. Returns bytes read.
async fn drain<R>(stream: &'static str, mut reader: R, sink: Arc<dyn LogSink>) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut decoder = Utf8Chunker::default();
    let mut total = 0u64;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() {
                    if let Err(e) = sink.append(&text).await {
                        warn!(stream, error = %e, "Failed to append worker output");
                    }
                }
            }
            Err(e) => {
                error!(stream, error = %e, "Error reading worker output");
                let note = format!("\n[{stream} read error: {e}]\n");
                if let Err(e) = sink.append(&note).await {
                    warn!(stream, error = %e, "Failed to record read error");
                }
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        if let Err(e) = sink.append(&rest).await {
            warn!(stream, error = %e, "Failed to append worker output");
        }
    }

    total
}

/// Turns a byte stream into text without splitting multi-byte characters
/// across chunks. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[start..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        // Incomplete character at the end, wait for more bytes.
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerCommand;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        text: Mutex<String>,
    }

    #[async_trait]
    impl LogSink for MemorySink {
        async fn append(&self, chunk: &str) -> Result<(), SupervisorError> {
            self.text.lock().await.push_str(chunk);
            Ok(())
        }
    }

    #[test]
    fn test_chunker_keeps_split_characters() {
        let mut chunker = Utf8Chunker::default();
        let bytes = "héllo ✓".as_bytes();
        // Split inside the two-byte 'é' and inside the three-byte '✓'.
        let first = chunker.push(&bytes[..2]);
        let second = chunker.push(&bytes[2..8]);
        let third = chunker.push(&bytes[8..]);
        assert_eq!(first, "h");
        assert_eq!(format!("{first}{second}{third}"), "héllo ✓");
        assert!(chunker.finish().is_empty());
    }

    #[test]
    fn test_chunker_replaces_invalid_bytes() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(chunker.push(b"\xe2\x9c"), "");
        assert_eq!(chunker.finish(), "\u{fffd}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervise_captures_both_streams() {
        let sink = Arc::new(MemorySink::default());
        let worker = WorkerCommand::new("sh")
            .args(["-c", "echo to-stdout; echo to-stderr 1>&2; exit 3"])
            .spawn()
            .unwrap();

        let report = worker
            .supervise(sink.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.exit_code, Some(3));
        assert!(!report.success());
        assert!(!report.cancelled);
        let text = sink.text.lock().await.clone();
        assert!(text.contains("to-stdout\n"));
        assert!(text.contains("to-stderr\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_worker() {
        let sink = Arc::new(MemorySink::default());
        let worker = WorkerCommand::new("sh")
            .args(["-c", "echo started; exec sleep 30"])
            .spawn()
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let report = worker.supervise(sink, cancel).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.success());
        assert!(report.elapsed < Duration::from_secs(30));
    }
}
