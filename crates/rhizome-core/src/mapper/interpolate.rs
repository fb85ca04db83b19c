//! Interpolation layer: place every remaining anchor between its matched
//! neighbors by ordinal position. Never fails.

use super::Placement;
use crate::models::MatchConfidence;
use crate::text::ChunkStream;

/// Fill every empty slot with a synthetic placement. Returns how many
/// slots were filled.
pub fn fill(stream: &ChunkStream<'_>, slots: &mut [Option<Placement>]) -> usize {
    let mut filled = 0;
    let mut i = 0;
    while i < slots.len() {
        if slots[i].is_some() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < slots.len() && slots[i].is_none() {
            i += 1;
        }
        let count = i - run_start;

        let lo = run_start
            .checked_sub(1)
            .and_then(|p| slots[p])
            .map_or(stream.start(), |p| p.end);
        let hi = slots
            .get(i)
            .copied()
            .flatten()
            .map_or(stream.end(), |p| p.start)
            .max(lo);
        let width = hi - lo;

        for k in 0..count {
            let (start, end) = if width >= count {
                let s = lo + width * k / count;
                let e = (lo + width * (k + 1) / count).max(s + 1);
                (s, e)
            } else {
                let s = lo.min(stream.end().saturating_sub(1)).max(stream.start());
                (s, (s + 1).min(stream.end()).max(s))
            };
            slots[run_start + k] = Some(Placement {
                start,
                end,
                confidence: MatchConfidence::Synthetic,
            });
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, SemanticProfile};

    fn stream_chunks(len: usize) -> Vec<Chunk> {
        let text = "x".repeat(len);
        vec![Chunk {
            id: "c0".to_string(),
            document_id: "doc".to_string(),
            text,
            start_offset: 0,
            end_offset: len,
            chunk_index: 0,
            metadata: None,
            profile: SemanticProfile::default(),
        }]
    }

    fn placed(start: usize, end: usize) -> Option<Placement> {
        Some(Placement {
            start,
            end,
            confidence: MatchConfidence::Exact,
        })
    }

    #[test]
    fn test_gap_split_between_neighbors() {
        let chunks = stream_chunks(100);
        let stream = ChunkStream::new(&chunks).unwrap();
        let mut slots = vec![placed(0, 10), None, None, placed(50, 60)];
        assert_eq!(fill(&stream, &mut slots), 2);
        let a = slots[1].unwrap();
        let b = slots[2].unwrap();
        assert_eq!((a.start, a.end), (10, 30));
        assert_eq!((b.start, b.end), (30, 50));
        assert_eq!(a.confidence, MatchConfidence::Synthetic);
    }

    #[test]
    fn test_leading_and_trailing_runs_use_stream_bounds() {
        let chunks = stream_chunks(100);
        let stream = ChunkStream::new(&chunks).unwrap();
        let mut slots = vec![None, placed(40, 60), None];
        assert_eq!(fill(&stream, &mut slots), 2);
        assert_eq!(slots[0].unwrap().start, 0);
        assert_eq!(slots[0].unwrap().end, 40);
        assert_eq!(slots[2].unwrap().start, 60);
        assert_eq!(slots[2].unwrap().end, 100);
    }

    #[test]
    fn test_no_anchor_matched() {
        let chunks = stream_chunks(9);
        let stream = ChunkStream::new(&chunks).unwrap();
        let mut slots = vec![None, None, None];
        assert_eq!(fill(&stream, &mut slots), 3);
        let starts: Vec<usize> = slots.iter().map(|s| s.unwrap().start).collect();
        assert_eq!(starts, vec![0, 3, 6]);
    }

    #[test]
    fn test_narrow_gap_still_yields_non_empty_span() {
        let chunks = stream_chunks(20);
        let stream = ChunkStream::new(&chunks).unwrap();
        let mut slots = vec![placed(0, 10), None, None, None, placed(11, 20)];
        fill(&stream, &mut slots);
        for slot in &slots[1..4] {
            let p = slot.unwrap();
            assert!(p.end > p.start);
            assert!(p.start >= 10 && p.end <= 20);
        }
    }

    #[test]
    fn test_full_slots_untouched() {
        let chunks = stream_chunks(20);
        let stream = ChunkStream::new(&chunks).unwrap();
        let mut slots = vec![placed(0, 5), placed(5, 10)];
        assert_eq!(fill(&stream, &mut slots), 0);
        assert_eq!(slots[1].unwrap().confidence, MatchConfidence::Exact);
    }
}
