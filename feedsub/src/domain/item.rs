//! Retrieved items and their identity

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Identity of an item, used for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an ID from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A record produced by a fetcher
///
/// Equality and hashing consider `id` only, so two records with the same ID
/// but different payloads are the same item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,

    /// Opaque payload, delivered as-is
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Item {
    /// Create an item with no payload
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Create an item carrying a payload
    pub fn with_data(id: impl Into<ItemId>, data: serde_json::Value) -> Self {
        Self { id: id.into(), data }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
