//! Batched, partial-failure-tolerant connection persistence.
//!
//! Connections are written in batches of at most
//! [`MAX_BATCH_SIZE`](crate::config::MAX_BATCH_SIZE) rows. A failed batch
//! is retried once (when enabled); if it fails again it is logged with its
//! row counts and skipped. Remaining batches are always attempted.

use serde::Serialize;
use tracing::{error, info, warn};

use rhizome_core::models::Connection;
use rhizome_core::store::ConnectionStore;

use crate::config::{PersistenceConfig, MAX_BATCH_SIZE};

/// What a persistence pass managed to write.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistReport {
    pub batches: usize,
    pub batches_failed: usize,
    pub retries: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
}

/// Write `connections` to `store` in bounded batches.
pub async fn persist_connections(
    store: &dyn ConnectionStore,
    connections: &[Connection],
    config: &PersistenceConfig,
) -> PersistReport {
    let batch_size = config.batch_size.clamp(1, MAX_BATCH_SIZE);
    let mut report = PersistReport::default();

    for (index, batch) in connections.chunks(batch_size).enumerate() {
        report.batches += 1;
        let mut outcome = store.insert_connections(batch).await;

        if let Err(e) = &outcome {
            if config.retry_failed_batch {
                warn!(batch = index, rows = batch.len(), error = %e, "connection batch failed, retrying");
                report.retries += 1;
                outcome = store.insert_connections(batch).await;
            }
        }

        match outcome {
            Ok(written) => report.rows_written += written,
            Err(e) => {
                report.batches_failed += 1;
                report.rows_failed += batch.len();
                error!(
                    batch = index,
                    rows_failed = batch.len(),
                    rows_written = report.rows_written,
                    error = %e,
                    "connection batch skipped"
                );
            }
        }
    }

    info!(
        batches = report.batches,
        rows_written = report.rows_written,
        rows_failed = report.rows_failed,
        "connections persisted"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhizome_core::models::{Explanation, RelationType};
    use rhizome_core::store::memory::InMemoryStore;

    fn conns(n: usize) -> Vec<Connection> {
        (0..n)
            .map(|i| Connection {
                source_chunk_id: "s".to_string(),
                target_chunk_id: format!("t{i}"),
                relation_type: RelationType::StructuralIsomorphism,
                weighted_score: 0.5,
                raw_strength: 0.5,
                engine_name: "structural_isomorphism".to_string(),
                metadata: Explanation::StructuralIsomorphism {
                    shared_patterns: Vec::new(),
                    similarity: 0.5,
                },
            })
            .collect()
    }

    fn config(batch_size: usize, retry: bool) -> PersistenceConfig {
        PersistenceConfig {
            batch_size,
            retry_failed_batch: retry,
        }
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let store = InMemoryStore::new();
        let report = persist_connections(&store, &conns(25), &config(10, true)).await;
        assert_eq!(report.batches, 3);
        assert_eq!(report.rows_written, 25);
        assert_eq!(store.len(), 25);
    }

    #[tokio::test]
    async fn test_failed_batch_retried_once() {
        let store = InMemoryStore::new();
        store.fail_next_inserts(1);
        let report = persist_connections(&store, &conns(5), &config(10, true)).await;
        assert_eq!(report.retries, 1);
        assert_eq!(report.batches_failed, 0);
        assert_eq!(report.rows_written, 5);
    }

    #[tokio::test]
    async fn test_failed_retry_skips_batch_and_continues() {
        let store = InMemoryStore::new();
        store.fail_next_inserts(2);
        let report = persist_connections(&store, &conns(15), &config(10, true)).await;
        assert_eq!(report.batches, 2);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.rows_failed, 10);
        assert_eq!(report.rows_written, 5);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled() {
        let store = InMemoryStore::new();
        store.fail_next_inserts(1);
        let report = persist_connections(&store, &conns(3), &config(10, false)).await;
        assert_eq!(report.retries, 0);
        assert_eq!(report.rows_failed, 3);
    }
}
