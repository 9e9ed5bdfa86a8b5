//! Best-effort introspection of the persisted vector store.
//!
//! The backup never depends on this: whatever [`StoreInspector`] returns,
//! the vector store directory is archived as an opaque tree. The result only
//! enriches `vector_store.info`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, Row};
use std::path::Path;
use std::time::Duration;

use crate::models::CollectionStats;

/// Reads collection names and item counts from a persisted store.
#[async_trait]
pub trait StoreInspector: Send + Sync {
    /// List collections in the store rooted at `store_dir`, sorted by name.
    async fn list_collections(&self, store_dir: &Path) -> Result<Vec<CollectionStats>>;
}

/// Inspector for ChromaDB's persistent layout (`chroma.sqlite3`).
///
/// Opens the catalog database read-only and counts embeddings per
/// collection through its segments. Any schema mismatch surfaces as an
/// error for the caller to degrade on.
pub struct ChromaInspector {
    busy_timeout: Duration,
}

impl ChromaInspector {
    pub const CATALOG_FILE: &'static str = "chroma.sqlite3";

    pub fn new() -> Self {
        Self {
            busy_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for ChromaInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreInspector for ChromaInspector {
    async fn list_collections(&self, store_dir: &Path) -> Result<Vec<CollectionStats>> {
        let db_path = store_dir.join(Self::CATALOG_FILE);
        if !db_path.is_file() {
            bail!("{} not found", db_path.display());
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(self.busy_timeout);

        let mut conn = options
            .connect()
            .await
            .with_context(|| format!("Failed to open {}", db_path.display()))?;

        let rows = sqlx::query(
            r#"
            SELECT c.name AS name, COUNT(e.id) AS count
            FROM collections c
            LEFT JOIN segments s ON s.collection = c.id
            LEFT JOIN embeddings e ON e.segment_id = s.id
            GROUP BY c.id, c.name
            ORDER BY c.name
            "#,
        )
        .fetch_all(&mut conn)
        .await
        .with_context(|| "Failed to query collections")?;

        let stats = rows
            .iter()
            .map(|row| -> anyhow::Result<CollectionStats> {
                Ok(CollectionStats {
                    name: row.try_get("name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| "Unexpected collections schema")?;

        let _ = conn.close().await;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed_chroma(dir: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(dir.join(ChromaInspector::CATALOG_FILE))
            .create_if_missing(true);
        let mut conn = options.connect().await.unwrap();

        for stmt in [
            "CREATE TABLE collections (id TEXT PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE segments (id TEXT PRIMARY KEY, type TEXT, scope TEXT, collection TEXT)",
            "CREATE TABLE embeddings (id INTEGER PRIMARY KEY, segment_id TEXT, embedding_id TEXT)",
            "INSERT INTO collections VALUES ('c1', 'langchain'), ('c2', 'archive')",
            "INSERT INTO segments VALUES ('s1', 'sqlite', 'METADATA', 'c1'), ('s2', 'hnsw', 'VECTOR', 'c2')",
            "INSERT INTO embeddings (segment_id, embedding_id) VALUES ('s1', 'a'), ('s1', 'b'), ('s1', 'c')",
        ] {
            sqlx::query(stmt).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_counts_per_collection() {
        let tmp = TempDir::new().unwrap();
        seed_chroma(tmp.path()).await;

        let stats = ChromaInspector::new()
            .list_collections(tmp.path())
            .await
            .unwrap();
        assert_eq!(
            stats,
            vec![
                CollectionStats {
                    name: "archive".into(),
                    count: 0
                },
                CollectionStats {
                    name: "langchain".into(),
                    count: 3
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_catalog_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(ChromaInspector::new()
            .list_collections(tmp.path())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_null_collection_name_is_error() {
        let tmp = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(tmp.path().join(ChromaInspector::CATALOG_FILE))
            .create_if_missing(true);
        let mut conn = options.connect().await.unwrap();
        for stmt in [
            "CREATE TABLE collections (id TEXT PRIMARY KEY, name TEXT)",
            "CREATE TABLE segments (id TEXT PRIMARY KEY, collection TEXT)",
            "CREATE TABLE embeddings (id INTEGER PRIMARY KEY, segment_id TEXT)",
            "INSERT INTO collections VALUES ('c1', NULL)",
        ] {
            sqlx::query(stmt).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();

        let err = ChromaInspector::new()
            .list_collections(tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected collections schema"));
    }

    #[tokio::test]
    async fn test_foreign_schema_is_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(ChromaInspector::CATALOG_FILE), b"not a database").unwrap();
        assert!(ChromaInspector::new()
            .list_collections(tmp.path())
            .await
            .is_err());
    }
}
