//! The per-document connection pipeline.
//!
//! ```text
//! chunks + anchors
//!       │
//!       ▼
//! CoordinateMapper ──▶ transfer_metadata ──▶ embedding backfill
//!                                                   │
//!                                                   ▼
//!                       store ◀── persist ◀── Orchestrator (per chunk)
//! ```
//!
//! Mapping and detection failures that are structural abort the document
//! with a [`PipelineError`]. Everything else (an engine failing, the
//! embedding service being down, a batch write failing) is logged,
//! counted in the [`RunReport`], and the run continues.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rhizome_core::embedding::EmbeddingProvider;
use rhizome_core::error::PipelineError;
use rhizome_core::mapper::{CoordinateMapper, MappingReport};
use rhizome_core::models::{Anchor, Chunk, Connection, MatchResult, RequiredField};
use rhizome_core::store::ConnectionStore;
use rhizome_core::transfer::{transfer_metadata, TransferConfig, TransferReport};

use crate::config::{Config, PersistenceConfig};
use crate::embedding::create_provider;
use crate::locator::create_locator;
use crate::orchestrator::Orchestrator;
use crate::persist::persist_connections;
use crate::report::RunReport;

/// One document as supplied by the upstream extraction and chunking stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

/// Chunks enriched with structural metadata, plus how they got it.
#[derive(Debug, Clone, Serialize)]
pub struct MappedDocument {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    pub matches: Vec<MatchResult>,
    pub mapping: MappingReport,
    pub transfer: TransferReport,
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub report: RunReport,
    pub connections: Vec<Connection>,
}

pub struct Pipeline {
    mapper: CoordinateMapper,
    transfer: TransferConfig,
    orchestrator: Arc<Orchestrator>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    embed_batch_size: usize,
    persistence: PersistenceConfig,
}

impl Pipeline {
    pub fn new(
        mapper: CoordinateMapper,
        transfer: TransferConfig,
        orchestrator: Orchestrator,
        persistence: PersistenceConfig,
    ) -> Self {
        Self {
            mapper,
            transfer,
            orchestrator: Arc::new(orchestrator),
            embedder: None,
            embed_batch_size: 64,
            persistence,
        }
    }

    /// Backfill missing chunk embeddings with `embedder` before detection.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        self.embedder = Some(embedder);
        self.embed_batch_size = batch_size.max(1);
        self
    }

    /// Assemble the pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut mapper = CoordinateMapper::new(config.mapper.mapper_config());
        let embedder = if config.embedding.is_enabled() {
            Some(create_provider(&config.embedding)?)
        } else {
            None
        };
        if let (Some(embedder), true) = (&embedder, config.mapper.embedding_layer) {
            mapper = mapper.with_embedder(Arc::clone(embedder));
        }
        if let Some(locator) = create_locator(&config.locator)? {
            mapper = mapper.with_locator(locator);
        }

        let orchestrator = Orchestrator::from_config(config)?;
        let pipeline = Self::new(
            mapper,
            config.transfer.transfer_config(),
            orchestrator,
            config.persistence.clone(),
        );
        Ok(match embedder {
            Some(embedder) => pipeline.with_embedder(embedder, config.embedding.batch_size),
            None => pipeline,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Map anchors and transfer structural metadata onto the chunks.
    pub async fn map_document(&self, input: &DocumentInput) -> Result<MappedDocument, PipelineError> {
        let mapped = self
            .mapper
            .match_anchors(&input.document_id, &input.chunks, &input.anchors)
            .await?;
        let transferred = transfer_metadata(&input.chunks, &input.anchors, &mapped.matches, &self.transfer);

        Ok(MappedDocument {
            document_id: input.document_id.clone(),
            chunks: transferred.chunks,
            matches: mapped.matches,
            mapping: mapped.report,
            transfer: transferred.report,
        })
    }

    /// Run the full pipeline for one document and persist its connections.
    ///
    /// `library` holds already-enriched chunks from other documents; they
    /// join this document's chunks in the candidate pool.
    pub async fn process_document(
        &self,
        input: &DocumentInput,
        library: &[Chunk],
        store: &dyn ConnectionStore,
    ) -> Result<DocumentOutcome, PipelineError> {
        let mut mapped = self.map_document(input).await?;
        let embedded_chunks = self.backfill_embeddings(&mut mapped.chunks).await;

        let candidates: Arc<[Chunk]> = mapped
            .chunks
            .iter()
            .chain(library.iter().filter(|c| c.document_id != input.document_id))
            .cloned()
            .collect();
        let detected = self
            .orchestrator
            .run_document(&mapped.chunks, candidates)
            .await?;

        // Chunks cut off by the deadline keep whatever an earlier run stored.
        if let Err(e) = store.clear_sources(&detected.completed_chunk_ids).await {
            warn!(document_id = %input.document_id, error = %e, "failed to clear previous connections");
        }
        let persistence = persist_connections(store, &detected.connections, &self.persistence).await;

        let report = RunReport {
            document_id: input.document_id.clone(),
            chunks: mapped.chunks.len(),
            mapping: mapped.mapping,
            transfer: mapped.transfer,
            embedded_chunks,
            engines: detected.stats,
            connections: detected.connections.len(),
            persistence,
            deadline_exceeded: detected.deadline_exceeded,
            chunks_completed: detected.chunks_completed,
        };
        info!(
            document_id = %report.document_id,
            chunks = report.chunks,
            connections = report.connections,
            coverage = report.transfer.coverage,
            "document processed"
        );

        Ok(DocumentOutcome {
            report,
            connections: detected.connections,
        })
    }

    /// Embed chunks that arrived without a vector. Returns how many were
    /// filled. A provider failure stops the backfill without failing the run.
    async fn backfill_embeddings(&self, chunks: &mut [Chunk]) -> usize {
        let Some(embedder) = &self.embedder else {
            return 0;
        };
        let pending: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.has_field(RequiredField::Embedding) && !c.text.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        let mut filled = 0;
        for batch in pending.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
            match embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (&i, vector) in batch.iter().zip(vectors) {
                        chunks[i].profile.embedding = Some(vector);
                        filled += 1;
                    }
                }
                Ok(vectors) => {
                    warn!(expected = batch.len(), got = vectors.len(), "embedding backfill: wrong vector count");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, model = embedder.model_name(), "embedding backfill failed, continuing without");
                    break;
                }
            }
        }
        filled
    }
}
