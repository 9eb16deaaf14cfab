// Offline Media Core - offline media downloads for mobile playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Generic persisted key-value layer
//!
//! The record and queue stores only need "string value per key, grouped by
//! namespace". `KeyValueStore` is that contract; `SqliteKeyValueStore` is the
//! implementation shipped with the crate. Hosts can inject their own (for
//! example a platform preferences store) behind the same trait.

use crate::error::Result;
use crate::storage::Database;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Namespaced durable key-value persistence
///
/// Writes are atomic per key. `entries` returns pairs in first-insertion
/// order; replacing a key keeps its position.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, namespace: &str, key: &str) -> Result<()>;

    async fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>>;

    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// SQLite-backed key-value store (`KeyValueEntries` table)
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM KeyValueEntries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO KeyValueEntries (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM KeyValueEntries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM KeyValueEntries WHERE namespace = ? ORDER BY seq ASC")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Ok((row.try_get("key")?, row.try_get("value")?)))
            .collect()
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        sqlx::query("DELETE FROM KeyValueEntries WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteKeyValueStore {
        let db = Database::new_in_memory().await.unwrap();
        SqliteKeyValueStore::new(&db)
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let kv = store().await;
        assert_eq!(kv.get("ns", "a").await.unwrap(), None);

        kv.put("ns", "a", "1").await.unwrap();
        assert_eq!(kv.get("ns", "a").await.unwrap().as_deref(), Some("1"));

        kv.remove("ns", "a").await.unwrap();
        assert_eq!(kv.get("ns", "a").await.unwrap(), None);

        // Removing a missing key is fine
        kv.remove("ns", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let kv = store().await;
        kv.put("records", "m1", "r").await.unwrap();
        kv.put("queue", "m1", "q").await.unwrap();

        assert_eq!(kv.get("records", "m1").await.unwrap().as_deref(), Some("r"));
        kv.clear("queue").await.unwrap();
        assert!(kv.entries("queue").await.unwrap().is_empty());
        assert_eq!(kv.entries("records").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_keeps_insertion_order() {
        let kv = store().await;
        kv.put("q", "first", "1").await.unwrap();
        kv.put("q", "second", "2").await.unwrap();
        kv.put("q", "first", "1b").await.unwrap();

        let entries = kv.entries("q").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("first".to_string(), "1b".to_string()),
                ("second".to_string(), "2".to_string()),
            ]
        );
    }
}
