use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per persisted connection. `metadata_json` holds the
    // engine's tagged explanation.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            id TEXT PRIMARY KEY,
            source_chunk_id TEXT NOT NULL,
            target_chunk_id TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            engine_name TEXT NOT NULL,
            raw_strength REAL NOT NULL,
            weighted_score REAL NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connections_source ON connections(source_chunk_id, weighted_score DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_target ON connections(target_chunk_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connections_engine ON connections(engine_name, relation_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
