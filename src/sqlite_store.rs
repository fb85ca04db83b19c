//! SQLite-backed [`ConnectionStore`].
//!
//! Each batch is written with a single multi-row `INSERT` inside a
//! transaction, so a batch either lands whole or not at all. Batches are
//! independent of each other; a document's connections are not atomic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use rhizome_core::models::{Connection, Explanation, RelationType};
use rhizome_core::store::{ConnectionCount, ConnectionStore};

use crate::config::MAX_BATCH_SIZE;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn insert_connections(&self, batch: &[Connection]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        if batch.len() > MAX_BATCH_SIZE {
            anyhow::bail!(
                "batch of {} rows exceeds the {} row limit",
                batch.len(),
                MAX_BATCH_SIZE
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(batch.len());
        for c in batch {
            let metadata = serde_json::to_string(&c.metadata)
                .with_context(|| format!("Failed to encode explanation for {}", c.source_chunk_id))?;
            rows.push((uuid::Uuid::new_v4().to_string(), c, metadata));
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO connections (id, source_chunk_id, target_chunk_id, relation_type, \
             engine_name, raw_strength, weighted_score, metadata_json, created_at) ",
        );
        builder.push_values(rows, |mut b, (id, c, metadata)| {
            b.push_bind(id)
                .push_bind(c.source_chunk_id.clone())
                .push_bind(c.target_chunk_id.clone())
                .push_bind(c.relation_type.as_str())
                .push_bind(c.engine_name.clone())
                .push_bind(c.raw_strength)
                .push_bind(c.weighted_score)
                .push_bind(metadata)
                .push_bind(now);
        });

        let mut tx = self.pool.begin().await?;
        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected() as usize)
    }

    async fn clear_sources(&self, source_chunk_ids: &[String]) -> Result<usize> {
        let mut removed = 0u64;
        for ids in source_chunk_ids.chunks(MAX_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM connections WHERE source_chunk_id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
            removed += builder.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(removed as usize)
    }

    async fn connections_for(&self, source_chunk_id: &str, limit: usize) -> Result<Vec<Connection>> {
        let rows = sqlx::query(
            "SELECT source_chunk_id, target_chunk_id, relation_type, engine_name, \
             raw_strength, weighted_score, metadata_json \
             FROM connections WHERE source_chunk_id = ? \
             ORDER BY weighted_score DESC, rowid ASC LIMIT ?",
        )
        .bind(source_chunk_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let relation: String = row.get("relation_type");
            let metadata_json: String = row.get("metadata_json");
            let relation_type = RelationType::parse(&relation)
                .with_context(|| format!("Unknown relation type in database: {relation}"))?;
            let metadata: Explanation = serde_json::from_str(&metadata_json)
                .with_context(|| "Failed to decode connection metadata")?;
            out.push(Connection {
                source_chunk_id: row.get("source_chunk_id"),
                target_chunk_id: row.get("target_chunk_id"),
                relation_type,
                weighted_score: row.get("weighted_score"),
                raw_strength: row.get("raw_strength"),
                engine_name: row.get("engine_name"),
                metadata,
            });
        }
        Ok(out)
    }

    async fn connection_counts(&self) -> Result<Vec<ConnectionCount>> {
        let rows = sqlx::query(
            "SELECT engine_name, relation_type, COUNT(*) AS n FROM connections \
             GROUP BY engine_name, relation_type ORDER BY engine_name, relation_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConnectionCount {
                engine_name: row.get("engine_name"),
                relation_type: row.get("relation_type"),
                count: row.get("n"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn conn(source: &str, target: &str, score: f64) -> Connection {
        Connection {
            source_chunk_id: source.to_string(),
            target_chunk_id: target.to_string(),
            relation_type: RelationType::CrossDomainBridge,
            weighted_score: score,
            raw_strength: score,
            engine_name: "thematic_bridge".to_string(),
            metadata: Explanation::ThematicBridge {
                shared_themes: vec!["emergence".to_string()],
                theme_overlap: 0.5,
                domain_distance: 1.0,
                source_domain: Some("philosophy".to_string()),
                target_domain: None,
            },
        }
    }

    #[tokio::test]
    async fn test_roundtrip_ranked() {
        let store = memory_store().await;
        let written = store
            .insert_connections(&[conn("a", "x", 0.3), conn("a", "y", 0.8), conn("b", "z", 0.5)])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let found = store.connections_for("a", 10).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].target_chunk_id, "y");
        assert_eq!(found[0], conn("a", "y", 0.8));
    }

    #[tokio::test]
    async fn test_clear_and_count() {
        let store = memory_store().await;
        store
            .insert_connections(&[conn("a", "x", 0.3), conn("b", "y", 0.8)])
            .await
            .unwrap();
        assert_eq!(store.clear_sources(&["a".to_string()]).await.unwrap(), 1);
        let counts = store.connection_counts().await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].relation_type, "cross_domain_bridge");
        assert_eq!(counts[0].count, 1);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let store = memory_store().await;
        let batch: Vec<Connection> = (0..MAX_BATCH_SIZE + 1)
            .map(|i| conn("a", &format!("t{i}"), 0.1))
            .collect();
        assert!(store.insert_connections(&batch).await.is_err());
    }
}
