//! Assisted layer: ask an external text-understanding capability where an
//! anchor best fits inside a bounded context window.
//!
//! The locator returns a verbatim excerpt of the context. The excerpt is
//! only trusted if it actually occurs in the context; anything else is a
//! hallucinated position and the anchor falls through to interpolation.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{expected_offset, MapperConfig, Placement};
use crate::models::{Anchor, MatchConfidence};
use crate::text::ChunkStream;

/// External capability that proposes where `anchor_text` sits in `context`.
#[async_trait]
pub trait TextLocator: Send + Sync {
    /// Return the excerpt of `context` that best corresponds to
    /// `anchor_text`, or `None` when there is no plausible match.
    async fn locate(&self, anchor_text: &str, context: &str) -> Result<Option<String>>;
}

pub async fn run(
    stream: &ChunkStream<'_>,
    anchors: &[&Anchor],
    slots: &mut [Option<Placement>],
    config: &MapperConfig,
    locator: &dyn TextLocator,
) -> usize {
    let mut matched = 0;
    for pos in 0..anchors.len() {
        if slots[pos].is_some() || anchors[pos].text.trim().is_empty() {
            continue;
        }
        let expected = expected_offset(stream, anchors, slots, pos);
        let half = config.assisted_context_chars / 2;
        let ctx_start = expected.saturating_sub(half).max(stream.start());
        let ctx_end = (expected + half).min(stream.end());
        let context = stream.slice(ctx_start, ctx_end);

        let excerpt = match locator.locate(&anchors[pos].text, &context).await {
            Ok(Some(e)) => e,
            Ok(None) => continue,
            Err(e) => {
                warn!(anchor_id = %anchors[pos].id, error = %e, "assisted locator failed");
                continue;
            }
        };
        let excerpt = excerpt.trim();
        if excerpt.is_empty() {
            continue;
        }

        let Some(byte_pos) = context.find(excerpt) else {
            debug!(anchor_id = %anchors[pos].id, "assisted location rejected: excerpt not in context");
            continue;
        };
        let start = ctx_start + context[..byte_pos].chars().count();
        slots[pos] = Some(Placement {
            start,
            end: start + excerpt.chars().count(),
            confidence: MatchConfidence::Medium,
        });
        matched += 1;
    }
    matched
}
