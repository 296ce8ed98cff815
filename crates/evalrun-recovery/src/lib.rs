//! Result recovery for evaluation worker logs.
//!
//! The worker prints a human-readable log and, somewhere in it, a
//! `Detailed Results:` line followed by an array of per-task result objects.
//! That array comes out of a different serialization convention than JSON, so
//! recovery degrades through three tiers, each tried only if the previous one
//! failed:
//!
//! 1. [`Tier::Direct`]: parse the block as JSON.
//! 2. [`Tier::Normalized`]: decode the foreign escapes, re-escape string
//!    contents, then parse (see [`normalize`]).
//! 3. [`Tier::Salvaged`]: pull `task_name`, `success` and `time_used` out with
//!    regular expressions (see [`salvage`]).
//!
//! # Example
//!
//! ```rust
//! use evalrun_recovery::{recover, Tier};
//!
//! let log = r#"Detailed Results: [{"task_name": "t1", "success": true, "time_used": 1.2}]"#;
//! let recovery = recover(log).unwrap();
//! assert_eq!(recovery.tier, Tier::Direct);
//! assert_eq!(recovery.outcomes[0].task_name.as_deref(), Some("t1"));
//! ```

mod error;
mod extract;
pub mod normalize;
pub mod salvage;

use std::fmt;

use evalrun_core::RawOutcome;
use tracing::{debug, info, warn};

pub use error::RecoveryError;
pub use extract::{extract_block, RESULTS_MARKER};

/// Which tier produced the outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Direct,
    Normalized,
    Salvaged,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Normalized => f.write_str("normalized"),
            Self::Salvaged => f.write_str("salvaged"),
        }
    }
}

/// Outcomes recovered from a log, in the order they appeared.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub outcomes: Vec<RawOutcome>,
    pub tier: Tier,
}

/// Recover task outcomes from a full log snapshot.
pub fn recover(log: &str) -> Result<Recovery, RecoveryError> {
    let block = extract_block(log, RESULTS_MARKER)?;
    debug!(block_len = block.len(), "Extracted results block");
    recover_block(block)
}

/// Recover task outcomes from an already extracted array block.
pub fn recover_block(block: &str) -> Result<Recovery, RecoveryError> {
    match serde_json::from_str::<Vec<RawOutcome>>(block) {
        Ok(outcomes) => {
            return Ok(Recovery {
                outcomes,
                tier: Tier::Direct,
            })
        }
        Err(e) => debug!(error = %e, "Results block is not valid JSON, normalizing escapes"),
    }

    let normalized = normalize::normalize(block);
    let normalize_error = match serde_json::from_str::<Vec<RawOutcome>>(&normalized) {
        Ok(outcomes) => {
            return Ok(Recovery {
                outcomes,
                tier: Tier::Normalized,
            })
        }
        Err(e) => e,
    };

    warn!(error = %normalize_error, "Failed to parse results after escape normalization, salvaging fields");
    let outcomes = salvage::salvage(block).map_err(|e| {
        RecoveryError::NothingSalvaged(format!("{e}; after normalization: {normalize_error}"))
    })?;
    info!(count = outcomes.len(), "Extracted results using regex fallback");

    Ok(Recovery {
        outcomes,
        tier: Tier::Salvaged,
    })
}
