use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed wrapper for a store's opaque, fleet-unique identity.
///
/// Store IDs are assigned out-of-band (field install), not generated by
/// this system, so unlike most typed IDs in the ecosystem this wraps a
/// `String` rather than a `Uuid`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub String);

impl StoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StoreId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for StoreId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<StoreId> for String {
    fn from(id: StoreId) -> Self {
        id.0
    }
}
