//! Newtype wrapper for session identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const SESSION_PREFIX: &str = "eval-";

/// Unique identifier for an evaluation session.
///
/// Ids have the form `eval-<unix millis>`, so ordering by id is ordering by
/// creation time. The digits-only suffix also keeps ids safe to use as a
/// directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Build the id for a given creation instant in milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(format!("{SESSION_PREFIX}{millis}"))
    }

    /// Generate an id from the current time.
    pub fn generate() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Parse and validate an id received from outside.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let digits = raw
            .strip_prefix(SESSION_PREFIX)
            .ok_or_else(|| CoreError::InvalidSessionId(raw.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidSessionId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Milliseconds since the epoch encoded in the id.
    pub fn millis(&self) -> i64 {
        self.0[SESSION_PREFIX.len()..].parse().unwrap_or_default()
    }

    /// The id one millisecond later, used to resolve creation collisions.
    pub fn next(&self) -> Self {
        Self::from_millis(self.millis() + 1)
    }

    /// Creation instant encoded in the id.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.millis())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl Ord for SessionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis()
            .cmp(&other.millis())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SessionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
