//! In-memory [`ConnectionStore`] for tests and embedded use.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Writes can be made to fail on
//! demand to exercise batch retry paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{ConnectionCount, ConnectionStore};
use crate::models::Connection;

/// In-memory connection store.
pub struct InMemoryStore {
    rows: RwLock<Vec<Connection>>,
    failures_remaining: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` calls to `insert_connections` fail.
    pub fn fail_next_inserts(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Connection>>> {
        self.rows.read().map_err(|_| anyhow!("connection store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Connection>>> {
        self.rows.write().map_err(|_| anyhow!("connection store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn insert_connections(&self, batch: &[Connection]) -> Result<usize> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            bail!("injected write failure for batch of {} rows", batch.len());
        }
        self.write()?.extend_from_slice(batch);
        Ok(batch.len())
    }

    async fn clear_sources(&self, source_chunk_ids: &[String]) -> Result<usize> {
        let mut rows = self.write()?;
        let before = rows.len();
        rows.retain(|c| !source_chunk_ids.contains(&c.source_chunk_id));
        Ok(before - rows.len())
    }

    async fn connections_for(&self, source_chunk_id: &str, limit: usize) -> Result<Vec<Connection>> {
        let mut found: Vec<Connection> = self
            .read()?
            .iter()
            .filter(|c| c.source_chunk_id == source_chunk_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
        found.truncate(limit);
        Ok(found)
    }

    async fn connection_counts(&self) -> Result<Vec<ConnectionCount>> {
        let mut counts: BTreeMap<(String, String), i64> = BTreeMap::new();
        for c in self.read()?.iter() {
            *counts
                .entry((c.engine_name.clone(), c.relation_type.as_str().to_string()))
                .or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((engine_name, relation_type), count)| ConnectionCount {
                engine_name,
                relation_type,
                count,
            })
            .collect())
    }
}
