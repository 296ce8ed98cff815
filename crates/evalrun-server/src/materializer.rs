//! Turns recovered outcomes into persisted per-task result records.

use chrono::Utc;
use evalrun_core::{RawOutcome, SessionId, TaskResult};
use evalrun_recovery::Tier;
use tracing::{debug, info};

use crate::error::{MaterializeError, StoreError};
use crate::store::SessionStore;

/// Results written for one session by a single recovery run.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub tier: Tier,
    pub results: Vec<TaskResult>,
}

/// Write one result record per outcome, all stamped with the same instant.
///
/// Writes overwrite by task id, so running this again over the same outcomes
/// leaves one record per task with the newer timestamp.
pub async fn materialize(
    store: &SessionStore,
    id: &SessionId,
    outcomes: &[RawOutcome],
) -> Result<Vec<TaskResult>, StoreError> {
    let at = Utc::now();
    let mut written = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        let result = TaskResult::from_outcome(outcome, at);
        store.write_task_result(id, &result).await?;
        debug!(
            session_id = %id,
            task_id = %result.task_id,
            success = result.success,
            "Result materialized"
        );
        written.push(result);
    }

    Ok(written)
}

/// Recover outcomes from the session log and materialize them.
pub async fn recover_session(
    store: &SessionStore,
    id: &SessionId,
) -> Result<Materialized, MaterializeError> {
    let log = store.read_log(id).await?;
    let recovery = evalrun_recovery::recover(&log)?;
    let results = materialize(store, id, &recovery.outcomes).await?;

    info!(
        session_id = %id,
        tier = %recovery.tier,
        count = results.len(),
        "Results recovered from log"
    );
    Ok(Materialized {
        tier: recovery.tier,
        results,
    })
}
