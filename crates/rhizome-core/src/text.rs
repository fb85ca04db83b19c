//! Character-offset text utilities for coordinate mapping.
//!
//! [`ChunkStream`] rebuilds the canonical document text from a chunk list
//! so anchors can be searched across chunk boundaries and every match can
//! be reported in absolute character offsets. [`NormalizedText`] applies
//! the aggressive normalization used by fuzzy matching while remembering
//! where each normalized character came from.

use crate::models::Chunk;

/// The chunk "text universe": canonical text reconstructed from chunks.
///
/// Positions are absolute character offsets. Gaps between chunks are
/// filled with spaces; overlapping chunks are written in offset order.
pub struct ChunkStream<'a> {
    base: usize,
    chars: Vec<char>,
    text: String,
    /// Byte offset of each char in `text`.
    char_starts: Vec<usize>,
    /// `(start, end, chunk)` sorted by start.
    spans: Vec<(usize, usize, &'a Chunk)>,
}

impl<'a> ChunkStream<'a> {
    /// Build the stream. Returns `None` when there are no chunks.
    pub fn new(chunks: &'a [Chunk]) -> Option<Self> {
        let base = chunks.iter().map(|c| c.start_offset).min()?;
        let end = chunks
            .iter()
            .map(|c| c.end_offset.max(c.start_offset))
            .max()
            .unwrap_or(base);

        let mut chars = vec![' '; end - base];
        let mut spans: Vec<(usize, usize, &Chunk)> = chunks
            .iter()
            .map(|c| (c.start_offset, c.end_offset.max(c.start_offset), c))
            .collect();
        spans.sort_by_key(|(start, end, _)| (*start, *end));

        for (start, end, chunk) in &spans {
            for (pos, ch) in (*start..*end).zip(chunk.text.chars()) {
                chars[pos - base] = ch;
            }
        }

        let text: String = chars.iter().collect();
        let char_starts = text.char_indices().map(|(i, _)| i).collect();

        Some(Self {
            base,
            chars,
            text,
            char_starts,
            spans,
        })
    }

    /// First absolute offset of the universe.
    pub fn start(&self) -> usize {
        self.base
    }

    /// Exclusive last absolute offset of the universe.
    pub fn end(&self) -> usize {
        self.base + self.chars.len()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Characters of the absolute range `[start, end)`, clamped to the universe.
    pub fn chars_in(&self, start: usize, end: usize) -> &[char] {
        let s = start.clamp(self.base, self.end()) - self.base;
        let e = end.clamp(self.base, self.end()) - self.base;
        &self.chars[s..e.max(s)]
    }

    /// Text of the absolute range `[start, end)`, clamped to the universe.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars_in(start, end).iter().collect()
    }

    /// Find `needle` at or after absolute offset `from`. Returns the
    /// absolute char offset of the match start.
    pub fn find(&self, needle: &str, from: usize) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        let rel = from.clamp(self.base, self.end()) - self.base;
        let byte_from = self.char_starts.get(rel).copied().unwrap_or(self.text.len());
        let byte_pos = self.text[byte_from..].find(needle)? + byte_from;
        let char_pos = self
            .char_starts
            .binary_search(&byte_pos)
            .unwrap_or_else(|i| i);
        Some(self.base + char_pos)
    }

    /// Id of the chunk best holding `[start, end)`: the one with the
    /// largest overlap, else the nearest chunk by distance. Ties go to the
    /// earlier chunk.
    pub fn chunk_for(&self, start: usize, end: usize) -> &'a str {
        let mut best: Option<(usize, &'a Chunk)> = None;
        for (s, e, chunk) in &self.spans {
            let overlap = end.min(*e).saturating_sub(start.max(*s));
            if overlap > 0 && best.map_or(true, |(b, _)| overlap > b) {
                best = Some((overlap, *chunk));
            }
        }
        if let Some((_, chunk)) = best {
            return &chunk.id;
        }

        let distance = |s: usize, e: usize| {
            if end <= s {
                s - end
            } else if start >= e {
                start - e
            } else {
                0
            }
        };
        let mut nearest = self.spans[0].2;
        let mut nearest_dist = usize::MAX;
        for (s, e, chunk) in &self.spans {
            let d = distance(*s, *e);
            if d < nearest_dist {
                nearest_dist = d;
                nearest = *chunk;
            }
        }
        &nearest.id
    }
}

/// Normalized characters paired with their absolute source offsets.
#[derive(Debug, Clone, Default)]
pub struct NormalizedText {
    pub chars: Vec<char>,
    /// `origin[i]` is the absolute offset of the character that produced `chars[i]`.
    pub origin: Vec<usize>,
}

impl NormalizedText {
    /// Normalize `chars`, whose first element sits at absolute offset `base`.
    pub fn from_chars(chars: &[char], base: usize) -> Self {
        let mut mapped: Vec<(char, usize)> = Vec::with_capacity(chars.len());
        for (i, &ch) in chars.iter().enumerate() {
            let pos = base + i;
            match ch {
                '\u{00AD}' => {}
                c if is_quote(c) => mapped.push(('\'', pos)),
                c if is_dash(c) => mapped.push(('-', pos)),
                c if c.is_whitespace() => mapped.push((' ', pos)),
                c => mapped.extend(c.to_lowercase().map(|l| (l, pos))),
            }
        }

        let mut out = NormalizedText::default();
        let mut i = 0;
        while i < mapped.len() {
            let (ch, pos) = mapped[i];
            // Line-break hyphenation: "sug- gests" -> "suggests".
            if ch == '-' && mapped.get(i + 1).is_some_and(|(n, _)| *n == ' ') {
                i += 1;
                while mapped.get(i).is_some_and(|(n, _)| *n == ' ') {
                    i += 1;
                }
                continue;
            }
            if ch == ' ' {
                if out.chars.last().map_or(true, |l| *l == ' ') {
                    i += 1;
                    continue;
                }
            } else if is_tight_punct(ch) && out.chars.last() == Some(&' ') {
                out.chars.pop();
                out.origin.pop();
            }
            out.chars.push(ch);
            out.origin.push(pos);
            i += 1;
        }
        if out.chars.last() == Some(&' ') {
            out.chars.pop();
            out.origin.pop();
        }
        out
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Normalize a standalone string (no offsets needed).
pub fn normalize(text: &str) -> Vec<char> {
    let chars: Vec<char> = text.chars().collect();
    NormalizedText::from_chars(&chars, 0).chars
}

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '"' | '\''
            | '`'
            | '\u{00B4}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201A}'
            | '\u{201B}'
            | '\u{201C}'
            | '\u{201D}'
            | '\u{201E}'
            | '\u{201F}'
    )
}

fn is_dash(c: char) -> bool {
    matches!(c, '\u{2010}'..='\u{2015}' | '\u{2212}')
}

fn is_tight_punct(c: char) -> bool {
    matches!(c, ',' | '.' | '!' | '?' | ';' | ':')
}
