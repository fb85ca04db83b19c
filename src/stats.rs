//! Connection store statistics.
//!
//! Provides a quick summary of what has been persisted: total connections,
//! how many distinct chunks have outgoing connections, and a breakdown per
//! engine and relation type. Used by `rhz stats` to confirm that runs are
//! writing what they report.

use anyhow::Result;

use rhizome_core::store::{ConnectionCount, ConnectionStore};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connections")
        .fetch_one(&pool)
        .await?;
    let sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_chunk_id) FROM connections")
        .fetch_one(&pool)
        .await?;
    let last_write: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM connections")
        .fetch_one(&pool)
        .await?;

    let store = SqliteStore::new(pool);
    let counts = store.connection_counts().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Rhizome: Connection Stats");
    println!("=========================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Connections:  {}", total);
    println!("  Sources:      {}", sources);
    println!(
        "  Last write:   {}",
        last_write.map(format_ts_iso).unwrap_or_else(|| "never".to_string())
    );

    if !counts.is_empty() {
        println!();
        print!("{}", render_counts(&counts));
    }

    println!();
    store.pool().close().await;
    Ok(())
}

/// Per-engine table, one row per (engine, relation type).
fn render_counts(counts: &[ConnectionCount]) -> String {
    let mut out = String::new();
    out.push_str("  By engine:\n");
    out.push_str(&format!(
        "  {:<26} {:<24} {:>8}\n",
        "ENGINE", "RELATION", "COUNT"
    ));
    out.push_str(&format!("  {}\n", "-".repeat(60)));
    for c in counts {
        out.push_str(&format!(
            "  {:<26} {:<24} {:>8}\n",
            c.engine_name, c.relation_type, c.count
        ));
    }
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
