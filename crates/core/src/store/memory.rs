//! In-memory state store.
//!
//! The whole database is one JSON tree behind a lock, so a patch applied
//! under a single write guard is trivially atomic. Used by tests and by
//! single-process deployments that do not need durability.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::tree;
use super::types::{KeyFilter, Patch, PatchOp, StateStore, StoreError};

/// In-memory state store.
#[derive(Debug)]
pub struct MemoryStateStore {
    root: RwLock<Value>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Create a store pre-populated with `root` (useful for testing).
    pub fn with_root(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    /// Copy of the entire tree.
    pub fn snapshot(&self) -> Value {
        self.root
            .read()
            .map(|root| root.clone())
            .unwrap_or(Value::Null)
    }

    fn lock_error() -> StoreError {
        StoreError::Database("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let root = self.root.read().map_err(|_| Self::lock_error())?;
        Ok(tree::get(&root, &tree::segments(path)).cloned())
    }

    async fn list(
        &self,
        collection: &str,
        filter: &KeyFilter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let root = self.root.read().map_err(|_| Self::lock_error())?;
        let Some(children) = tree::get(&root, &tree::segments(collection)).and_then(Value::as_object)
        else {
            return Ok(Vec::new());
        };

        let mut keys: Vec<&String> = children.keys().filter(|k| filter.matches(k)).collect();
        keys.sort();
        if filter.limit > 0 {
            keys.truncate(filter.limit);
        }

        Ok(keys
            .into_iter()
            .map(|key| {
                let value = if filter.shallow {
                    Value::Bool(true)
                } else {
                    children[key.as_str()].clone()
                };
                (key.clone(), value)
            })
            .collect())
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut root = self.root.write().map_err(|_| Self::lock_error())?;
        tree::set(&mut root, &tree::segments(path), value);
        Ok(())
    }

    async fn patch(&self, root_path: &str, patch: &Patch) -> Result<(), StoreError> {
        let mut root = self.root.write().map_err(|_| Self::lock_error())?;
        for (relative, _) in patch.ops() {
            if tree::join(root_path, relative).is_empty() {
                return Err(StoreError::InvalidPath(relative.to_string()));
            }
        }
        for (relative, op) in patch.ops() {
            let path = tree::join(root_path, relative);
            let segs = tree::segments(&path);
            match op {
                PatchOp::Set(value) => tree::set(&mut root, &segs, value.clone()),
                PatchOp::Delete => tree::remove(&mut root, &segs),
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let segs = tree::segments(path);
        if segs.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut root = self.root.write().map_err(|_| Self::lock_error())?;
        tree::remove(&mut root, &segs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStateStore::new();
        store.put("jobs/a", json!({"status": "QUEUED"})).await.unwrap();

        assert_eq!(
            store.get("jobs/a/status").await.unwrap(),
            Some(json!("QUEUED"))
        );
        assert_eq!(store.get("jobs/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_patch_is_applied_as_a_whole() {
        let store = MemoryStateStore::new();
        store.put("cls_pending/1-1", json!(true)).await.unwrap();

        let patch = Patch::new()
            .delete("cls_pending/1-1")
            .set("cls/1-1/time_ended", json!("2026-01-01T00:00:00Z"));
        store.patch("", &patch).await.unwrap();

        assert_eq!(store.get("cls_pending/1-1").await.unwrap(), None);
        assert_eq!(
            store.get("cls/1-1/time_ended").await.unwrap(),
            Some(json!("2026-01-01T00:00:00Z"))
        );
    }

    #[tokio::test]
    async fn test_patch_with_root() {
        let store = MemoryStateStore::new();
        let patch = Patch::new().set("a", json!(1)).set("b", json!(2));
        store.patch("jobs_queued", &patch).await.unwrap();

        let listed = store.list("jobs_queued", &KeyFilter::new()).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_and_shallow() {
        let store = MemoryStateStore::new();
        for key in ["100-1", "100-2", "1000-1", "99-1"] {
            store
                .put(&format!("cls/{}", key), json!({"change_id": key}))
                .await
                .unwrap();
        }

        let listed = store
            .list("cls", &KeyFilter::new().with_prefix("100-"))
            .await
            .unwrap();
        let keys: Vec<_> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["100-1", "100-2"]);

        let listed = store
            .list("cls", &KeyFilter::new().shallow().with_limit(1))
            .await
            .unwrap();
        assert_eq!(listed, vec![("100-1".to_string(), json!(true))]);
    }

    #[tokio::test]
    async fn test_list_missing_collection_is_empty() {
        let store = MemoryStateStore::new();
        assert!(store
            .list("jobs_running", &KeyFilter::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_root_rejected() {
        let store = MemoryStateStore::new();
        assert!(matches!(
            store.delete("/").await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
