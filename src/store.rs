#![forbid(unsafe_code)]

//! Key-value persistence for channel listings and share records.
//!
//! The store is a plain namespaced mapping from string key to string value
//! with an optional JSON metadata blob per record. Callers agree on literal
//! key prefixes (`channel#`, `uuid#`) and the store itself knows nothing
//! about what the values mean.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Builder, Connection, params};

/// Value plus the metadata blob persisted alongside it.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub value: String,
    pub metadata: Option<serde_json::Value>,
}

/// The four operations every backing namespace has to provide. Writes are
/// single atomic puts; visibility of a write to later reads may lag.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredRecord>>;
    async fn put(
        &self,
        key: &str,
        value: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            metadata_json TEXT
        );
        "#,
    )
    .await?;
    Ok(())
}

/// Durable store backed by a single SQLite table.
pub struct LibsqlStore {
    conn: Connection,
}

impl LibsqlStore {
    /// Opens (and if necessary creates) the DB and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening store DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for LibsqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", [key])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(row.get(0)?))
    }

    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredRecord>> {
        let mut rows = self
            .conn
            .query("SELECT value, metadata_json FROM kv WHERE key = ?1", [key])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let value: String = row.get(0)?;
        let metadata_json: Option<String> = row.get(1)?;
        let metadata = match metadata_json {
            Some(raw) => {
                Some(serde_json::from_str(&raw).context("parsing stored record metadata")?)
            }
            None => None,
        };
        Ok(Some(StoredRecord { value, metadata }))
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let metadata_json = metadata
            .map(serde_json::to_string)
            .transpose()
            .context("serializing record metadata")?;
        self.conn
            .execute(
                r#"
                INSERT INTO kv (key, value, metadata_json)
                VALUES (:key, :value, :metadata_json)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    metadata_json = excluded.metadata_json
                "#,
                params![key, value, metadata_json.as_deref()],
            )
            .await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut rows = match prefix_upper_bound(prefix) {
            Some(upper) => {
                self.conn
                    .query(
                        "SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                        params![prefix, upper],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query("SELECT key FROM kv ORDER BY key", params![])
                    .await?
            }
        };

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get(0)?);
        }
        Ok(keys)
    }
}

/// Smallest string sorting strictly after every key that starts with
/// `prefix`, so prefix listing becomes a range scan on the primary key.
/// Key prefixes are short ASCII, so bumping the final byte is enough.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last < 0x7f {
            let idx = bytes.len() - 1;
            bytes[idx] = last + 1;
            return String::from_utf8(bytes).ok();
        }
        bytes.pop();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn open_store() -> (tempfile::TempDir, LibsqlStore) {
        let dir = tempdir().unwrap();
        let store = LibsqlStore::open(&dir.path().join("kv/test.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn open_creates_db_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv/test.db");
        let _store = LibsqlStore::open(&path).await.unwrap();
        assert!(path.exists(), "database file should be created");

        let db = Builder::new_local(&path).build().await.unwrap();
        let conn = db.connect().unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='kv'",
                params![],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().expect("kv table exists");
        let name: String = row.get(0).unwrap();
        assert_eq!(name, "kv");
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let (_dir, store) = open_store().await;
        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(store.get_with_metadata("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let (_dir, store) = open_store().await;
        store.put("channel#abc", "payload", None).await.unwrap();
        assert_eq!(
            store.get("channel#abc").await.unwrap().as_deref(),
            Some("payload")
        );

        let record = store
            .get_with_metadata("channel#abc")
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(record.value, "payload");
        assert!(record.metadata.is_none());
    }

    #[tokio::test]
    async fn metadata_survives_roundtrip() {
        let (_dir, store) = open_store().await;
        let metadata = json!({"channelId": "abc", "expiresAt": 1234});
        store
            .put("channel#abc", "payload", Some(&metadata))
            .await
            .unwrap();

        let record = store
            .get_with_metadata("channel#abc")
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(record.metadata, Some(metadata));
    }

    #[tokio::test]
    async fn put_overwrites_value_and_metadata() {
        let (_dir, store) = open_store().await;
        let metadata = json!({"expiresAt": 1});
        store.put("key", "old", Some(&metadata)).await.unwrap();
        store.put("key", "new", None).await.unwrap();

        let record = store
            .get_with_metadata("key")
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(record.value, "new");
        assert!(record.metadata.is_none());
    }

    #[tokio::test]
    async fn empty_value_is_a_present_record() {
        let (_dir, store) = open_store().await;
        store.put("uuid#abc", "", None).await.unwrap();
        assert_eq!(store.get("uuid#abc").await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_sorts() {
        let (_dir, store) = open_store().await;
        store.put("channel#b", "", None).await.unwrap();
        store.put("channel#a", "", None).await.unwrap();
        store.put("uuid#z", "", None).await.unwrap();

        let keys = store.list("channel#").await.unwrap();
        assert_eq!(keys, vec!["channel#a", "channel#b"]);

        let keys = store.list("uuid#").await.unwrap();
        assert_eq!(keys, vec!["uuid#z"]);
    }

    #[tokio::test]
    async fn list_empty_prefix_returns_everything() {
        let (_dir, store) = open_store().await;
        store.put("channel#a", "", None).await.unwrap();
        store.put("uuid#b", "", None).await.unwrap();

        let keys = store.list("").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn prefix_upper_bound_bumps_final_byte() {
        assert_eq!(prefix_upper_bound("channel#").as_deref(), Some("channel$"));
        assert_eq!(prefix_upper_bound("uuid#").as_deref(), Some("uuid$"));
        assert!(prefix_upper_bound("").is_none());
    }
}
