//! Field-level salvage for blocks that cannot be repaired into JSON.

use std::sync::LazyLock;

use evalrun_core::RawOutcome;
use regex::Regex;

use crate::RecoveryError;

// Quotes may themselves be escaped when the block was printed inside another
// string, hence the optional backslashes.
static TASK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"(?:task_name|taskName)\\?"\s*:\s*\\?"([^"\\]+)\\?""#)
        .expect("task name pattern is valid")
});

static SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"success\\?"\s*:\s*(true|false|True|False)"#).expect("success pattern is valid")
});

static TIME_USED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"time_used\\?"\s*:\s*([\d.]+)"#).expect("time pattern is valid")
});

/// Recover task id, success flag and elapsed time by pattern matching.
///
/// Each field is collected independently and the lists are zipped by
/// position over the task names; a missing success flag reads as `false` and
/// a missing time as `0`. Free-form fields are left empty.
pub fn salvage(block: &str) -> Result<Vec<RawOutcome>, RecoveryError> {
    let names: Vec<&str> = TASK_NAME
        .captures_iter(block)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if names.is_empty() {
        return Err(RecoveryError::NothingSalvaged(
            "no task identifiers matched".to_string(),
        ));
    }

    let successes: Vec<bool> = SUCCESS
        .captures_iter(block)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().eq_ignore_ascii_case("true"))
        .collect();

    let times: Vec<f64> = TIME_USED
        .captures_iter(block)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().parse().unwrap_or(0.0))
        .collect();

    Ok(names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            RawOutcome::salvaged(
                *name,
                successes.get(i).copied().unwrap_or(false),
                times.get(i).copied().unwrap_or(0.0),
            )
        })
        .collect())
}
