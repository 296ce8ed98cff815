//! Locating the results array inside a log.

use crate::RecoveryError;

/// Label the worker prints right before its results array.
pub const RESULTS_MARKER: &str = "Detailed Results:";

/// Return the bracket-balanced array following the first `marker` in `log`.
///
/// Brackets are counted without regard to quoting, so the block ends at the
/// first `]` that brings the depth back to zero.
pub fn extract_block<'a>(log: &'a str, marker: &'static str) -> Result<&'a str, RecoveryError> {
    let marker_at = log
        .find(marker)
        .ok_or(RecoveryError::MarkerNotFound(marker))?;
    let after = &log[marker_at + marker.len()..];
    let open = after.find('[').ok_or(RecoveryError::ArrayNotFound)?;

    let mut depth = 0usize;
    for (offset, byte) in after.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&after[open..=open + offset]);
                }
            }
            _ => {}
        }
    }

    Err(RecoveryError::Unbalanced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_nested_block() {
        let log = "noise [0]\nDetailed Results: prefix [{\"a\": [1, [2]]}, {\"b\": []}] trailing ]";
        let block = extract_block(log, RESULTS_MARKER).unwrap();
        assert_eq!(block, "[{\"a\": [1, [2]]}, {\"b\": []}]");
    }

    #[test]
    fn test_missing_marker() {
        assert_eq!(
            extract_block("[1, 2]", RESULTS_MARKER),
            Err(RecoveryError::MarkerNotFound(RESULTS_MARKER))
        );
    }

    #[test]
    fn test_missing_array() {
        assert_eq!(
            extract_block("Detailed Results: none", RESULTS_MARKER),
            Err(RecoveryError::ArrayNotFound)
        );
    }

    #[test]
    fn test_unbalanced_block() {
        assert_eq!(
            extract_block("Detailed Results: [{\"a\": [1]}", RESULTS_MARKER),
            Err(RecoveryError::Unbalanced)
        );
    }

    #[test]
    fn test_first_marker_wins() {
        let log = "Detailed Results: [1]\nDetailed Results: [2]";
        assert_eq!(extract_block(log, RESULTS_MARKER).unwrap(), "[1]");
    }
}
