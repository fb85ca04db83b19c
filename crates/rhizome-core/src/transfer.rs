//! Metadata transfer: attach structural metadata (headings, pages, boxes)
//! from matched anchors to the semantic chunks they overlap.
//!
//! Each chunk aggregates every match whose interval overlaps its own.
//! Chunks with no overlap borrow metadata from the nearest match before
//! them (else after them) and are flagged `interpolated`.
//!
//! The run-level [`TransferReport`] exposes overlap coverage. Coverage
//! below the configured threshold is a quality warning, not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Anchor, Chunk, ChunkMetadata, MatchResult, MetadataConfidence};

/// A chunk with this many overlapping anchors is always `high`.
const HIGH_OVERLAP_COUNT: usize = 3;
const HIGH_OVERLAP_FRACTION: f64 = 0.7;
const MEDIUM_OVERLAP_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Overlap coverage below this emits a warning.
    pub coverage_warning_threshold: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            coverage_warning_threshold: 0.7,
        }
    }
}

/// Aggregate statistics for one transfer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferReport {
    pub chunks: usize,
    /// Chunks with at least one overlapping match.
    pub covered: usize,
    pub interpolated: usize,
    /// `covered / chunks`; `1.0` for an empty document.
    pub coverage: f64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TransferReport {
    pub fn coverage_percent(&self) -> f64 {
        self.coverage * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub chunks: Vec<Chunk>,
    pub report: TransferReport,
}

/// Half-open interval overlap: `a.start < b.end && a.end > b.start`.
pub fn has_overlap(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> bool {
    a_start < b_end && a_end > b_start
}

/// Share of the chunk `[chunk_start, chunk_end)` covered by `[start, end)`.
///
/// ```rust
/// use rhizome_core::transfer::overlap_fraction;
///
/// assert_eq!(overlap_fraction(10, 20, 15, 25), 0.5);
/// assert_eq!(overlap_fraction(10, 20, 20, 30), 0.0);
/// ```
pub fn overlap_fraction(chunk_start: usize, chunk_end: usize, start: usize, end: usize) -> f64 {
    let chunk_len = chunk_end.saturating_sub(chunk_start);
    if chunk_len == 0 || !has_overlap(chunk_start, chunk_end, start, end) {
        return 0.0;
    }
    let overlap = chunk_end.min(end) - chunk_start.max(start);
    overlap as f64 / chunk_len as f64
}

/// Grade a chunk's metadata from its overlap count and largest fraction.
pub fn classify_confidence(overlap_count: usize, max_fraction: f64) -> MetadataConfidence {
    if overlap_count >= HIGH_OVERLAP_COUNT || max_fraction >= HIGH_OVERLAP_FRACTION {
        MetadataConfidence::High
    } else if max_fraction >= MEDIUM_OVERLAP_FRACTION {
        MetadataConfidence::Medium
    } else {
        MetadataConfidence::Low
    }
}

/// Attach metadata to every chunk.
///
/// `anchors` supplies the structural metadata for each match by
/// `anchor_id`; matches whose anchor is unknown are ignored. Input
/// chunks are not modified; enriched copies are returned in input order.
pub fn transfer_metadata(
    chunks: &[Chunk],
    anchors: &[Anchor],
    matches: &[MatchResult],
    config: &TransferConfig,
) -> TransferOutcome {
    let by_id: HashMap<&str, &Anchor> = anchors.iter().map(|a| (a.id.as_str(), a)).collect();
    let resolved: Vec<(&MatchResult, &Anchor)> = matches
        .iter()
        .filter_map(|m| by_id.get(m.anchor_id.as_str()).map(|a| (m, *a)))
        .collect();
    if resolved.len() < matches.len() {
        debug!(
            unresolved = matches.len() - resolved.len(),
            "matches without a known anchor ignored"
        );
    }

    let mut report = TransferReport {
        chunks: chunks.len(),
        ..Default::default()
    };

    let enriched: Vec<Chunk> = chunks
        .iter()
        .map(|chunk| {
            let metadata = chunk_metadata(chunk, &resolved);
            if metadata.overlap_count > 0 {
                report.covered += 1;
            }
            if metadata.interpolated {
                report.interpolated += 1;
                debug!(chunk_id = %chunk.id, "chunk metadata interpolated from neighbor");
            }
            match metadata.confidence {
                MetadataConfidence::High => report.high += 1,
                MetadataConfidence::Medium => report.medium += 1,
                MetadataConfidence::Low => report.low += 1,
            }
            Chunk {
                metadata: Some(metadata),
                ..chunk.clone()
            }
        })
        .collect();

    report.coverage = if report.chunks == 0 {
        1.0
    } else {
        report.covered as f64 / report.chunks as f64
    };

    if report.coverage < config.coverage_warning_threshold {
        warn!(
            coverage = report.coverage,
            chunks = report.chunks,
            covered = report.covered,
            threshold = config.coverage_warning_threshold,
            "low overlap coverage between chunks and anchors"
        );
    }
    info!(
        chunks = report.chunks,
        covered = report.covered,
        interpolated = report.interpolated,
        "metadata transfer complete"
    );

    TransferOutcome {
        chunks: enriched,
        report,
    }
}

fn chunk_metadata(chunk: &Chunk, matches: &[(&MatchResult, &Anchor)]) -> ChunkMetadata {
    let overlapping: Vec<&(&MatchResult, &Anchor)> = matches
        .iter()
        .filter(|(m, _)| has_overlap(chunk.start_offset, chunk.end_offset, m.start_offset, m.end_offset))
        .collect();

    if overlapping.is_empty() {
        return interpolated_metadata(chunk, matches);
    }

    let mut meta = ChunkMetadata {
        overlap_count: overlapping.len(),
        interpolated: false,
        ..Default::default()
    };
    let mut max_fraction: f64 = 0.0;
    for (m, anchor) in &overlapping {
        max_fraction = max_fraction.max(overlap_fraction(
            chunk.start_offset,
            chunk.end_offset,
            m.start_offset,
            m.end_offset,
        ));
        merge_anchor(&mut meta, anchor);
    }
    meta.confidence = classify_confidence(meta.overlap_count, max_fraction);
    meta
}

/// Borrow metadata from the nearest match ending at or before the chunk,
/// else the nearest starting at or after it.
fn interpolated_metadata(chunk: &Chunk, matches: &[(&MatchResult, &Anchor)]) -> ChunkMetadata {
    let before = matches
        .iter()
        .filter(|(m, _)| m.end_offset <= chunk.start_offset)
        .max_by_key(|(m, _)| (m.end_offset, m.start_offset));
    let after = matches
        .iter()
        .filter(|(m, _)| m.start_offset >= chunk.end_offset)
        .min_by_key(|(m, _)| (m.start_offset, m.end_offset));

    let mut meta = ChunkMetadata::default();
    if let Some((_, anchor)) = before.or(after) {
        merge_anchor(&mut meta, anchor);
    }
    meta
}

fn merge_anchor(meta: &mut ChunkMetadata, anchor: &Anchor) {
    for heading in &anchor.heading_path {
        if !meta.heading_path.contains(heading) {
            meta.heading_path.push(heading.clone());
        }
    }
    if let Some(p) = anchor.page_start {
        meta.page_start = Some(meta.page_start.map_or(p, |cur| cur.min(p)));
    }
    if let Some(p) = anchor.page_end {
        meta.page_end = Some(meta.page_end.map_or(p, |cur| cur.max(p)));
    }
    meta.bounding_boxes.extend(anchor.bounding_boxes.iter().cloned());
    if meta.section_marker.is_none() {
        meta.section_marker = anchor.section_marker.clone();
    }
}
