//! Opaque user identifier
//!
//! Identities are issued by an external collaborator; the delivery core only
//! needs them to be non-empty, comparable and printable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id, rejecting blank input
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw identifier
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw identifier
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_blank() {
        assert_eq!(UserId::parse("  alice ").unwrap().as_str(), "alice");
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse("   ").is_none());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = UserId::from("u-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u-42\"");

        let parsed: UserId = serde_json::from_str("\"u-42\"").unwrap();
        assert_eq!(parsed, id);
    }
}
