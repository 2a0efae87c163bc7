//! SQLite-backed state store.
//!
//! Each top-level record (`{collection}/{key}`) is one row holding its JSON
//! tree. Deeper paths are read and written inside that tree. A patch runs in
//! one transaction, which gives the multi-key atomicity the controller needs.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};

use super::tree;
use super::types::{is_deletion, KeyFilter, Patch, PatchOp, StateStore, StoreError};

/// SQLite-backed state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database file and its schema.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("sqlite store lock poisoned".to_string()))
    }

    fn load_record(
        conn: &Connection,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM records WHERE collection = ? AND key = ?",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|raw| parse_value(collection, key, &raw)).transpose()
    }

    fn load_collection(
        conn: &Connection,
        collection: &str,
        filter: &KeyFilter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let limit = if filter.limit > 0 {
            filter.limit as i64
        } else {
            -1
        };
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM records
                 WHERE collection = ?1
                   AND (?2 = '' OR substr(key, 1, length(?2)) = ?2)
                   AND (?3 = '' OR key >= ?3)
                   AND (?4 = '' OR key < ?4)
                 ORDER BY key
                 LIMIT ?5",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    collection,
                    filter.prefix.as_deref().unwrap_or_default(),
                    filter.start_at.as_deref().unwrap_or_default(),
                    filter.end_before.as_deref().unwrap_or_default(),
                    limit,
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, raw) = row.map_err(db_err)?;
            let value = if filter.shallow {
                Value::Bool(true)
            } else {
                parse_value(collection, &key, &raw)?
            };
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Apply one write inside an open transaction.
    fn apply(tx: &Transaction<'_>, path: &str, op: &PatchOp) -> Result<(), StoreError> {
        let segs = tree::segments(path);
        match segs.as_slice() {
            [] => Err(StoreError::InvalidPath(path.to_string())),
            [collection] => {
                tx.execute(
                    "DELETE FROM records WHERE collection = ?",
                    params![collection],
                )
                .map_err(db_err)?;
                if let PatchOp::Set(Value::Object(children)) = op {
                    for (key, value) in children {
                        if !is_deletion(value) {
                            Self::upsert(tx, collection, key, value)?;
                        }
                    }
                }
                Ok(())
            }
            [collection, key, rest @ ..] => {
                let updated = if rest.is_empty() {
                    match op {
                        PatchOp::Set(value) => value.clone(),
                        PatchOp::Delete => Value::Null,
                    }
                } else {
                    let mut record = Self::load_record(tx, collection, key)?
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    match op {
                        PatchOp::Set(value) => tree::set(&mut record, rest, value.clone()),
                        PatchOp::Delete => tree::remove(&mut record, rest),
                    }
                    record
                };

                if is_deletion(&updated) {
                    tx.execute(
                        "DELETE FROM records WHERE collection = ? AND key = ?",
                        params![collection, key],
                    )
                    .map_err(db_err)?;
                    Ok(())
                } else {
                    Self::upsert(tx, collection, key, &updated)
                }
            }
        }
    }

    fn upsert(conn: &Connection, collection: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization {
            path: format!("{}/{}", collection, key),
            message: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO records (collection, key, value) VALUES (?, ?, ?)
             ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value",
            params![collection, key, raw],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn write_all<'a>(
        &self,
        writes: impl Iterator<Item = (String, &'a PatchOp)>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        for (path, op) in writes {
            // Dropping the transaction on error rolls everything back.
            Self::apply(&tx, &path, op)?;
        }
        tx.commit().map_err(db_err)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segs = tree::segments(path);
        let conn = self.lock()?;
        match segs.as_slice() {
            [] => Err(StoreError::InvalidPath(path.to_string())),
            [collection] => {
                let entries = Self::load_collection(&conn, collection, &KeyFilter::new())?;
                if entries.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Value::Object(entries.into_iter().collect())))
            }
            [collection, key, rest @ ..] => {
                let record = Self::load_record(&conn, collection, key)?;
                Ok(record.and_then(|record| tree::get(&record, rest).cloned()))
            }
        }
    }

    async fn list(
        &self,
        collection: &str,
        filter: &KeyFilter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let segs = tree::segments(collection);
        let [collection] = segs.as_slice() else {
            return Err(StoreError::InvalidPath(collection.to_string()));
        };
        let conn = self.lock()?;
        Self::load_collection(&conn, collection, filter)
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let op = PatchOp::Set(value);
        self.write_all(std::iter::once((path.to_string(), &op)))
    }

    async fn patch(&self, root: &str, patch: &Patch) -> Result<(), StoreError> {
        self.write_all(
            patch
                .ops()
                .map(|(relative, op)| (tree::join(root, relative), op)),
        )
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let op = PatchOp::Delete;
        self.write_all(std::iter::once((path.to_string(), &op)))
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_value(collection: &str, key: &str, raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
        path: format!("{}/{}", collection, key),
        message: e.to_string(),
    })
}
