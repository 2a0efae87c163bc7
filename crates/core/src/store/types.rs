//! Types for the state store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error at {path}: {message}")]
    Serialization { path: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// A single write inside a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Set(Value),
    Delete,
}

/// A multi-key write applied atomically: either every operation is visible
/// afterwards or none is.
///
/// Paths are relative to the root passed to [`StateStore::patch`]. Setting
/// `null` or `{}` at a path is equivalent to deleting it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: BTreeMap<String, PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw JSON value at `path`.
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.insert(path.into(), PatchOp::Set(value));
        self
    }

    /// Serialize `value` and set it at `path`.
    pub fn set_json<T: Serialize>(
        self,
        path: impl Into<String>,
        value: &T,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(self.set(path, value))
    }

    /// Delete whatever is stored at `path`.
    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.ops.insert(path.into(), PatchOp::Delete);
        self
    }

    /// Merge another patch into this one; later writes to the same path win.
    pub fn merge(mut self, other: Patch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> impl Iterator<Item = (&str, &PatchOp)> {
        self.ops.iter().map(|(path, op)| (path.as_str(), op))
    }

    pub fn get(&self, path: &str) -> Option<&PatchOp> {
        self.ops.get(path)
    }
}

/// Filter for listing the children of a collection.
///
/// Keys are compared bytewise, which is the order both backends sort in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Only keys `>=` this key.
    pub start_at: Option<String>,
    /// Only keys `<` this key.
    pub end_before: Option<String>,
    /// Maximum number of entries (0 = unlimited).
    pub limit: usize,
    /// Return `true` instead of each child's value.
    pub shallow: bool,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_start_at(mut self, key: impl Into<String>) -> Self {
        self.start_at = Some(key.into());
        self
    }

    pub fn with_end_before(mut self, key: impl Into<String>) -> Self {
        self.end_before = Some(key.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    /// Whether `key` passes the prefix and range bounds.
    pub fn matches(&self, key: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(start) = &self.start_at {
            if key < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end_before {
            if key >= end.as_str() {
                return false;
            }
        }
        true
    }
}

/// Trait for hierarchical key/value store backends.
///
/// Contract relied upon by the controller:
/// - read-your-writes within one process
/// - [`StateStore::patch`] is atomic across all keys it touches
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Read the value at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// List the children of a top-level collection in key order.
    async fn list(
        &self,
        collection: &str,
        filter: &KeyFilter,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Replace the value at `path`.
    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Apply every operation of `patch` under `root` atomically.
    async fn patch(&self, root: &str, patch: &Patch) -> Result<(), StoreError>;

    /// Remove the value at `path`. Removing a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Deserialize a value read from `path`.
pub fn decode<T: DeserializeOwned>(path: &str, value: Option<Value>) -> Result<Option<T>, StoreError> {
    value
        .map(|v| {
            serde_json::from_value(v).map_err(|e| StoreError::Serialization {
                path: path.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Whether writing `value` means deleting the path.
pub fn is_deletion(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_builder() {
        let patch = Patch::new()
            .set("cls/1-1/voted", json!(true))
            .delete("cls_pending/1-1");
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get("cls_pending/1-1"), Some(&PatchOp::Delete));
        assert_eq!(
            patch.get("cls/1-1/voted"),
            Some(&PatchOp::Set(json!(true)))
        );
    }

    #[test]
    fn test_patch_merge_later_wins() {
        let a = Patch::new().set("x", json!(1));
        let b = Patch::new().delete("x").set("y", json!(2));
        let merged = a.merge(b);
        assert_eq!(merged.get("x"), Some(&PatchOp::Delete));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_key_filter_bounds() {
        let filter = KeyFilter::new()
            .with_prefix("100-")
            .with_end_before("100-5");
        assert!(filter.matches("100-1"));
        assert!(!filter.matches("100-5"));
        assert!(!filter.matches("1000-1"));
        assert!(!filter.matches("99-1"));

        let filter = KeyFilter::new().with_start_at("b");
        assert!(!filter.matches("a"));
        assert!(filter.matches("b"));
    }

    #[test]
    fn test_deletion_values() {
        assert!(is_deletion(&json!(null)));
        assert!(is_deletion(&json!({})));
        assert!(!is_deletion(&json!(0)));
        assert!(!is_deletion(&json!({"a": 1})));
    }

    #[test]
    fn test_decode_reports_path() {
        let err = decode::<u32>("jobs/x/status", Some(json!("QUEUED"))).unwrap_err();
        assert!(err.to_string().contains("jobs/x/status"));
        assert_eq!(decode::<u32>("a", None).unwrap(), None);
    }
}
