//! Text layer: exact substring, normalized exact, then sliding-window fuzzy.
//!
//! Exact matches are searched from a moving cursor so repeated passages
//! resolve in document order; an out-of-order hit is still accepted but
//! does not move the cursor. Every exact match is re-sliced from the
//! stream and compared to the anchor text before it is accepted.
//!
//! The fuzzy pass works on aggressively normalized text (quotes, dashes,
//! hyphenation, whitespace, case) and maps window positions back to
//! canonical offsets. Only a probe prefix of long anchors is compared, and
//! only within `fuzzy_search_radius` of the expected position. The end of
//! a long anchor is then fixed by searching for its tail separately, so
//! text that is shorter or longer than the anchor does not skew the span.

use tracing::debug;

use super::{expected_offset, MapperConfig, Placement};
use crate::error::PipelineError;
use crate::models::{Anchor, MatchConfidence};
use crate::similarity::similarity_ratio;
use crate::text::{normalize, ChunkStream, NormalizedText};

/// Longest prefix of a normalized anchor compared against each window.
const FUZZY_PROBE_CHARS: usize = 256;

/// Trailing characters of a long anchor located on their own to find its end.
const FUZZY_TAIL_CHARS: usize = 50;

/// Counts of anchors placed by this layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayerCounts {
    pub exact: usize,
    pub fuzzy: usize,
}

pub fn run(
    stream: &ChunkStream<'_>,
    anchors: &[&Anchor],
    slots: &mut [Option<Placement>],
    config: &MapperConfig,
) -> Result<TextLayerCounts, PipelineError> {
    let mut counts = TextLayerCounts::default();

    let mut cursor = stream.start();
    for (pos, anchor) in anchors.iter().enumerate() {
        let needle = anchor.text.trim();
        if needle.is_empty() {
            continue;
        }
        let (start, in_order) = match stream.find(needle, cursor) {
            Some(s) => (s, true),
            None => match stream.find(needle, stream.start()) {
                Some(s) => (s, false),
                None => continue,
            },
        };
        let end = start + needle.chars().count();
        if stream.slice(start, end) != needle {
            return Err(PipelineError::ExactMatchMismatch {
                anchor_id: anchor.id.clone(),
                start,
                end,
            });
        }
        slots[pos] = Some(Placement {
            start,
            end,
            confidence: MatchConfidence::Exact,
        });
        if in_order {
            cursor = end;
        }
        counts.exact += 1;
    }

    if slots.iter().all(Option::is_some) {
        return Ok(counts);
    }

    let haystack = NormalizedText::from_chars(stream.chars_in(stream.start(), stream.end()), stream.start());
    if haystack.is_empty() {
        return Ok(counts);
    }

    for pos in 0..anchors.len() {
        if slots[pos].is_some() {
            continue;
        }
        let needle = normalize(&anchors[pos].text);
        if needle.is_empty() {
            continue;
        }
        let expected = expected_offset(stream, anchors, slots, pos);
        if let Some(placement) = fuzzy_locate(&haystack, &needle, expected, config) {
            debug!(
                anchor_id = %anchors[pos].id,
                confidence = placement.confidence.as_str(),
                "anchor matched by normalized text"
            );
            slots[pos] = Some(placement);
            counts.fuzzy += 1;
        }
    }

    Ok(counts)
}

/// Locate `needle` in `haystack` near absolute offset `expected`.
fn fuzzy_locate(
    haystack: &NormalizedText,
    needle: &[char],
    expected: usize,
    config: &MapperConfig,
) -> Option<Placement> {
    let n = needle.len();
    let hay = &haystack.chars;
    if n > hay.len() {
        return None;
    }

    let center = haystack.origin.partition_point(|&o| o < expected);
    let lo = center.saturating_sub(config.fuzzy_search_radius);
    let hi = (center + config.fuzzy_search_radius).min(hay.len() - n);
    let lo = lo.min(hi);

    // Normalized exact: a cleaned-up verbatim hit.
    if let Some(offset) = hay[lo..hi + n].windows(n).position(|w| w == needle) {
        return Some(placement(haystack, lo + offset, lo + offset + n, MatchConfidence::High));
    }

    let probe = &needle[..n.min(FUZZY_PROBE_CHARS)];
    let step = (n / 20).clamp(5, 10);
    let mut best_ratio = 0.0;
    let mut best_start = lo;
    let mut i = lo;
    while i <= hi {
        let end = (i + probe.len()).min(hay.len());
        let ratio = similarity_ratio(probe, &hay[i..end]);
        if ratio > best_ratio {
            best_ratio = ratio;
            best_start = i;
        }
        i += step;
    }

    let confidence = if best_ratio >= config.fuzzy_high_threshold {
        MatchConfidence::High
    } else if n >= config.short_anchor_chars && best_ratio >= config.fuzzy_medium_threshold {
        MatchConfidence::Medium
    } else {
        return None;
    };
    let end = if n > FUZZY_PROBE_CHARS {
        locate_tail(hay, needle, best_start, config).unwrap_or(best_start + n)
    } else {
        best_start + n
    };
    Some(placement(haystack, best_start, end, confidence))
}

/// Find where the last [`FUZZY_TAIL_CHARS`] of `needle` land when its head
/// starts at `start`. Returns the normalized end position.
///
/// The tail is searched within a quarter of the anchor's length either side
/// of where it would sit if the text matched the anchor char for char.
fn locate_tail(hay: &[char], needle: &[char], start: usize, config: &MapperConfig) -> Option<usize> {
    let n = needle.len();
    let tail = &needle[n - FUZZY_TAIL_CHARS..];
    if hay.len() < tail.len() {
        return None;
    }
    let nominal = start + (n - tail.len());
    let slack = n / 4;
    let lo = nominal.saturating_sub(slack).max(start + 1);
    let hi = (nominal + slack).min(hay.len() - tail.len());
    if lo > hi {
        return None;
    }

    let mut best_ratio = 0.0;
    let mut best_end = None;
    for i in lo..=hi {
        let ratio = similarity_ratio(tail, &hay[i..i + tail.len()]);
        if ratio > best_ratio {
            best_ratio = ratio;
            best_end = Some(i + tail.len());
        }
    }
    if best_ratio >= config.fuzzy_medium_threshold {
        best_end
    } else {
        None
    }
}

/// Translate a normalized span back to canonical offsets.
fn placement(haystack: &NormalizedText, start: usize, end: usize, confidence: MatchConfidence) -> Placement {
    let last = end.min(haystack.len()) - 1;
    Placement {
        start: haystack.origin[start],
        end: haystack.origin[last] + 1,
        confidence,
    }
}
