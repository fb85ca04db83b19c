//! Connection storage abstraction.
//!
//! The [`ConnectionStore`] trait is the only write path out of the
//! pipeline. Backends receive bounded batches and need not be
//! transactional across a whole document; a failing batch is retried or
//! logged by the caller, never silently dropped.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Connection;

/// Persisted connection count for one (engine, relation) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionCount {
    pub engine_name: String,
    pub relation_type: String,
    pub count: i64,
}

/// Abstract storage backend for connections.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_connections`](ConnectionStore::insert_connections) | Write one batch |
/// | [`clear_sources`](ConnectionStore::clear_sources) | Drop prior connections before a re-run |
/// | [`connections_for`](ConnectionStore::connections_for) | Ranked connections of one chunk |
/// | [`connection_counts`](ConnectionStore::connection_counts) | Totals per engine and relation |
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert one batch. Returns the number of rows written.
    async fn insert_connections(&self, batch: &[Connection]) -> Result<usize>;

    /// Delete every connection whose source is one of `source_chunk_ids`.
    async fn clear_sources(&self, source_chunk_ids: &[String]) -> Result<usize>;

    /// Connections originating at `source_chunk_id`, by `weighted_score` descending.
    async fn connections_for(&self, source_chunk_id: &str, limit: usize) -> Result<Vec<Connection>>;

    async fn connection_counts(&self) -> Result<Vec<ConnectionCount>>;
}
