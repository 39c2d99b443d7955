//! User identifiers.
//!
//! A [`UserId`] wraps a ULID and renders as `usr_<ulid>`. That string is the
//! subject of every session token and the primary key of the users table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const USER_ID_PREFIX: &str = "usr_";

/// Error returned when a string is not a valid [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid user ID: {}", self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Opaque, stable identifier for a user record.
///
/// Serializes as the bare ULID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Ulid);

impl UserId {
    /// Allocates a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{USER_ID_PREFIX}{}", self.0)
    }
}

/// Accepts `usr_<ulid>` and, for rows written before the prefix, a bare ULID.
impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.strip_prefix(USER_ID_PREFIX).unwrap_or(s);
        Ulid::from_str(ulid).map(Self).map_err(|e| ParseIdError {
            reason: e.to_string(),
        })
    }
}
