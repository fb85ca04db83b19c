//! Embedding layer: compare an anchor against windows near its expected
//! position and accept the most similar window above the threshold.
//!
//! Windows have the anchor's length and overlap by half. A provider error
//! stops the layer for the rest of the run; remaining anchors fall through
//! to later layers.

use tracing::{debug, warn};

use super::{expected_offset, MapperConfig, Placement};
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::{Anchor, MatchConfidence};
use crate::text::ChunkStream;

pub async fn run(
    stream: &ChunkStream<'_>,
    anchors: &[&Anchor],
    slots: &mut [Option<Placement>],
    config: &MapperConfig,
    embedder: &dyn EmbeddingProvider,
) -> usize {
    let mut matched = 0;
    for pos in 0..anchors.len() {
        if slots[pos].is_some() || anchors[pos].text.trim().is_empty() {
            continue;
        }
        let expected = expected_offset(stream, anchors, slots, pos);
        let windows = candidate_windows(stream, anchors[pos].text.chars().count(), expected, config);
        if windows.is_empty() {
            continue;
        }

        let mut texts = Vec::with_capacity(windows.len() + 1);
        texts.push(anchors[pos].text.clone());
        texts.extend(windows.iter().map(|&(s, e)| stream.slice(s, e)));

        let vectors = match embedder.embed(&texts).await {
            Ok(v) if v.len() == texts.len() => v,
            Ok(v) => {
                warn!(
                    anchor_id = %anchors[pos].id,
                    expected = texts.len(),
                    got = v.len(),
                    "embedding layer: provider returned wrong vector count"
                );
                continue;
            }
            Err(e) => {
                warn!(error = %e, "embedding layer disabled for this run");
                break;
            }
        };

        let anchor_vec = &vectors[0];
        let mut best: Option<(f64, (usize, usize))> = None;
        for (window, vec) in windows.iter().zip(&vectors[1..]) {
            let sim = f64::from(cosine_similarity(anchor_vec, vec));
            if best.map_or(true, |(b, _)| sim > b) {
                best = Some((sim, *window));
            }
        }

        if let Some((sim, (start, end))) = best {
            let confidence = if sim >= config.embedding_high_threshold {
                MatchConfidence::High
            } else if sim >= config.embedding_threshold {
                MatchConfidence::Medium
            } else {
                continue;
            };
            debug!(anchor_id = %anchors[pos].id, similarity = sim, "anchor matched by embedding");
            slots[pos] = Some(Placement {
                start,
                end,
                confidence,
            });
            matched += 1;
        }
    }
    matched
}

/// Half-overlapping windows of `len` chars centred on `expected`.
fn candidate_windows(
    stream: &ChunkStream<'_>,
    len: usize,
    expected: usize,
    config: &MapperConfig,
) -> Vec<(usize, usize)> {
    if stream.is_empty() {
        return Vec::new();
    }
    let len = len.clamp(1, stream.len());
    let stride = (len / 2).max(1);
    let max_start = stream.end() - len;
    let center = expected
        .saturating_sub(len / 2)
        .clamp(stream.start(), max_start);

    let radius = config.embedding_window_radius;
    let mut windows: Vec<(usize, usize)> = Vec::with_capacity(2 * radius + 1);
    for k in 0..=2 * radius {
        let start = if k < radius {
            center.saturating_sub(stride * (radius - k))
        } else {
            center + stride * (k - radius)
        };
        let start = start.clamp(stream.start(), max_start);
        if windows.last().map_or(true, |&(s, _)| s != start) {
            windows.push((start, start + len));
        }
    }
    windows
}
