//! Coordinate mapper: aligns structural anchors to the semantic chunk stream.
//!
//! Chunking and structural extraction disagree about boundaries, so each
//! anchor is located in the reconstructed chunk text by a sequence of
//! fallback layers. Every layer only sees anchors the previous layers left
//! unmatched:
//!
//! 1. **Text** ([`fuzzy`]): exact substring, then normalized exact, then
//!    sliding-window edit similarity.
//! 2. **Embedding** ([`semantic`]): cosine similarity between the anchor
//!    and windows near its expected position. Needs an [`EmbeddingProvider`].
//! 3. **Assisted** ([`assisted`]): an external [`TextLocator`] proposes a
//!    location inside a bounded context; proposals that do not occur
//!    verbatim in the context are rejected.
//! 4. **Interpolation** ([`interpolate`]): positions the remainder between
//!    matched neighbors by ordinal. Always succeeds.
//!
//! The result holds exactly one [`MatchResult`] per anchor, in input order.

pub mod assisted;
pub mod fuzzy;
pub mod interpolate;
pub mod semantic;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::models::{Anchor, Chunk, MatchConfidence, MatchResult};
use crate::text::ChunkStream;

pub use assisted::TextLocator;

/// Thresholds and search bounds for the mapping layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Edit similarity at or above which a fuzzy match is `high`.
    pub fuzzy_high_threshold: f64,
    /// Edit similarity at or above which a fuzzy match is `medium`.
    pub fuzzy_medium_threshold: f64,
    /// Anchors shorter than this (normalized chars) need the high threshold.
    pub short_anchor_chars: usize,
    /// Characters searched either side of the expected position.
    pub fuzzy_search_radius: usize,
    /// Cosine similarity at or above which an embedding match is accepted.
    pub embedding_threshold: f64,
    /// Cosine similarity at or above which an embedding match is `high`.
    pub embedding_high_threshold: f64,
    /// Half-overlapping windows compared either side of the expected position.
    pub embedding_window_radius: usize,
    /// Size of the context handed to the assisted locator.
    pub assisted_context_chars: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            fuzzy_high_threshold: 0.9,
            fuzzy_medium_threshold: 0.7,
            short_anchor_chars: 50,
            fuzzy_search_radius: 5000,
            embedding_threshold: 0.85,
            embedding_high_threshold: 0.95,
            embedding_window_radius: 3,
            assisted_context_chars: 2000,
        }
    }
}

impl MapperConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig {
                    reason: format!("mapper.{name} must be in [0.0, 1.0], got {v}"),
                })
            }
        };
        unit("fuzzy_high_threshold", self.fuzzy_high_threshold)?;
        unit("fuzzy_medium_threshold", self.fuzzy_medium_threshold)?;
        unit("embedding_threshold", self.embedding_threshold)?;
        unit("embedding_high_threshold", self.embedding_high_threshold)?;
        if self.fuzzy_medium_threshold > self.fuzzy_high_threshold {
            return Err(PipelineError::InvalidConfig {
                reason: "mapper.fuzzy_medium_threshold must not exceed fuzzy_high_threshold"
                    .to_string(),
            });
        }
        if self.embedding_threshold > self.embedding_high_threshold {
            return Err(PipelineError::InvalidConfig {
                reason: "mapper.embedding_threshold must not exceed embedding_high_threshold"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Per-layer match counts for one mapping run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingReport {
    pub anchors: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub embedding: usize,
    pub assisted: usize,
    pub interpolated: usize,
}

impl MappingReport {
    /// Fraction of anchors placed by real evidence rather than interpolation.
    pub fn recovery_rate(&self) -> f64 {
        if self.anchors == 0 {
            return 1.0;
        }
        (self.anchors - self.interpolated) as f64 / self.anchors as f64
    }
}

/// Matches in anchor input order plus the per-layer report.
#[derive(Debug, Clone)]
pub struct MappingOutcome {
    pub matches: Vec<MatchResult>,
    pub report: MappingReport,
}

/// A tentative position for one anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start: usize,
    pub end: usize,
    pub confidence: MatchConfidence,
}

/// The layered anchor-to-chunk aligner.
pub struct CoordinateMapper {
    config: MapperConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    locator: Option<Arc<dyn TextLocator>>,
}

impl CoordinateMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            config,
            embedder: None,
            locator: None,
        }
    }

    /// Enable the embedding layer.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Enable the assisted layer.
    pub fn with_locator(mut self, locator: Arc<dyn TextLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map every anchor onto the chunk stream.
    ///
    /// Returns exactly `anchors.len()` results, in input order. Fails only
    /// on structural problems: no chunks to map onto, or an exact match
    /// whose slice does not reproduce the anchor text.
    pub async fn match_anchors(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        anchors: &[Anchor],
    ) -> Result<MappingOutcome, PipelineError> {
        let mut report = MappingReport {
            anchors: anchors.len(),
            ..Default::default()
        };
        if anchors.is_empty() {
            return Ok(MappingOutcome {
                matches: Vec::new(),
                report,
            });
        }

        let stream = ChunkStream::new(chunks).ok_or_else(|| PipelineError::EmptyChunkStream {
            document_id: document_id.to_string(),
            anchor_count: anchors.len(),
        })?;

        // Document order; the sort is stable so equal offsets keep input order.
        let mut order: Vec<usize> = (0..anchors.len()).collect();
        order.sort_by_key(|&i| anchors[i].start_offset);
        let ordered: Vec<&Anchor> = order.iter().map(|&i| &anchors[i]).collect();
        let mut slots: Vec<Option<Placement>> = vec![None; ordered.len()];

        let text = fuzzy::run(&stream, &ordered, &mut slots, &self.config)?;
        report.exact = text.exact;
        report.fuzzy = text.fuzzy;

        if let Some(embedder) = &self.embedder {
            report.embedding =
                semantic::run(&stream, &ordered, &mut slots, &self.config, embedder.as_ref()).await;
        }

        if let Some(locator) = &self.locator {
            report.assisted =
                assisted::run(&stream, &ordered, &mut slots, &self.config, locator.as_ref()).await;
        }

        report.interpolated = interpolate::fill(&stream, &mut slots);

        let mut results: Vec<Option<MatchResult>> = vec![None; anchors.len()];
        for (pos, &input_idx) in order.iter().enumerate() {
            let anchor = &anchors[input_idx];
            let placement = slots[pos].ok_or_else(|| PipelineError::UnrecoverableAnchor {
                anchor_id: anchor.id.clone(),
            })?;
            if placement.confidence == MatchConfidence::Synthetic {
                debug!(anchor_id = %anchor.id, start = placement.start, "anchor placed by interpolation");
            }
            results[input_idx] = Some(MatchResult {
                anchor_id: anchor.id.clone(),
                chunk_id: stream.chunk_for(placement.start, placement.end).to_string(),
                start_offset: placement.start,
                end_offset: placement.end,
                confidence: placement.confidence,
            });
        }

        info!(
            document_id,
            anchors = report.anchors,
            exact = report.exact,
            fuzzy = report.fuzzy,
            embedding = report.embedding,
            assisted = report.assisted,
            interpolated = report.interpolated,
            "coordinate mapping complete"
        );

        Ok(MappingOutcome {
            matches: results.into_iter().flatten().collect(),
            report,
        })
    }
}

/// Where anchor `pos` (document order) is expected to land in the stream.
///
/// Between two placed neighbors the position is interpolated by ordinal;
/// otherwise it follows the anchor's relative offset in its own extraction.
pub(crate) fn expected_offset(
    stream: &ChunkStream<'_>,
    anchors: &[&Anchor],
    slots: &[Option<Placement>],
    pos: usize,
) -> usize {
    let prev = (0..pos).rev().find_map(|j| slots[j].map(|p| (j, p)));
    let next = (pos + 1..slots.len()).find_map(|k| slots[k].map(|p| (k, p)));

    if let (Some((j, a)), Some((k, b))) = (prev, next) {
        let lo = a.end;
        let hi = b.start.max(lo);
        return lo + (hi - lo) * (pos - j) / (k - j);
    }

    let first = anchors.first().map_or(0, |a| a.start_offset);
    let last = anchors
        .iter()
        .map(|a| a.end_offset.max(a.start_offset))
        .max()
        .unwrap_or(first);
    let span = last.saturating_sub(first);
    let rel = if span == 0 {
        pos as f64 / anchors.len().max(1) as f64
    } else {
        anchors[pos].start_offset.saturating_sub(first) as f64 / span as f64
    };
    stream.start() + (stream.len() as f64 * rel.clamp(0.0, 1.0)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticProfile;

    fn chunk(id: &str, text: &str, start: usize) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            start_offset: start,
            end_offset: start + text.chars().count(),
            chunk_index: 0,
            metadata: None,
            profile: SemanticProfile::default(),
        }
    }

    fn anchor(id: &str, text: &str, start: usize) -> Anchor {
        Anchor {
            id: id.to_string(),
            text: text.to_string(),
            start_offset: start,
            end_offset: start + text.chars().count(),
            heading_path: Vec::new(),
            page_start: None,
            page_end: None,
            bounding_boxes: Vec::new(),
            section_marker: None,
        }
    }

    #[tokio::test]
    async fn test_every_anchor_gets_one_result() {
        let chunks = vec![
            chunk("c0", "The first paragraph talks about minds. ", 0),
            chunk("c1", "The second paragraph talks about systems.", 39),
        ];
        let anchors = vec![
            anchor("a0", "The first paragraph talks about minds.", 0),
            anchor("a1", "completely unrelated heading text xyz", 40),
            anchor("a2", "The second paragraph talks about systems.", 80),
        ];
        let mapper = CoordinateMapper::new(MapperConfig::default());
        let out = mapper.match_anchors("doc", &chunks, &anchors).await.unwrap();

        assert_eq!(out.matches.len(), anchors.len());
        assert_eq!(out.matches[0].confidence, MatchConfidence::Exact);
        assert_eq!(out.matches[1].confidence, MatchConfidence::Synthetic);
        assert_eq!(out.matches[2].confidence, MatchConfidence::Exact);
        assert_eq!(out.matches[2].chunk_id, "c1");
        assert_eq!(out.report.exact, 2);
        assert_eq!(out.report.interpolated, 1);
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let chunks = vec![chunk("c0", "alpha beta gamma", 0)];
        let anchors = vec![anchor("late", "gamma", 11), anchor("early", "alpha", 0)];
        let mapper = CoordinateMapper::new(MapperConfig::default());
        let out = mapper.match_anchors("doc", &chunks, &anchors).await.unwrap();
        assert_eq!(out.matches[0].anchor_id, "late");
        assert_eq!(out.matches[0].start_offset, 11);
        assert_eq!(out.matches[1].anchor_id, "early");
        assert_eq!(out.matches[1].start_offset, 0);
    }

    #[tokio::test]
    async fn test_no_chunks_is_fatal() {
        let anchors = vec![anchor("a0", "text", 0)];
        let mapper = CoordinateMapper::new(MapperConfig::default());
        let err = mapper.match_anchors("doc-7", &[], &anchors).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyChunkStream { .. }));
        assert!(err.to_string().contains("doc-7"));
    }

    #[tokio::test]
    async fn test_no_anchors_is_empty() {
        let chunks = vec![chunk("c0", "text", 0)];
        let mapper = CoordinateMapper::new(MapperConfig::default());
        let out = mapper.match_anchors("doc", &chunks, &[]).await.unwrap();
        assert!(out.matches.is_empty());
        assert_eq!(out.report.recovery_rate(), 1.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(MapperConfig::default().validate().is_ok());
        let bad = MapperConfig {
            fuzzy_medium_threshold: 0.95,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let out_of_range = MapperConfig {
            embedding_threshold: 1.5,
            ..Default::default()
        };
        assert!(out_of_range.validate().is_err());
    }
}
