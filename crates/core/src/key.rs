use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized entity identifier.
///
/// Keys arrive from outside the engine (imported spreadsheets, other
/// subsystems) as strings or numbers; both renderings of the same id must
/// address the same entity. Normalization is trim-and-stringify, so
/// `EntityKey::from(42)` and `EntityKey::from(" 42 ")` compare equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EntityKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for EntityKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<i64> for EntityKey {
    fn from(raw: i64) -> Self {
        Self(raw.to_string())
    }
}

impl From<u64> for EntityKey {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.0)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
