//! Set and string similarity measures shared by the mapper and engines.
//!
//! - [`jaccard`]: `|A ∩ B| / |A ∪ B|` over case-folded label sets
//! - [`levenshtein`] / [`similarity_ratio`]: edit-distance similarity for
//!   fuzzy text alignment
//!
//! Cosine similarity for embedding vectors lives in [`crate::embedding`].

use std::collections::HashSet;

/// Case-fold and trim a label so `"Emergence "` and `"emergence"` compare equal.
fn fold(label: &str) -> String {
    label.trim().to_lowercase()
}

fn label_set<S: AsRef<str>>(items: &[S]) -> HashSet<String> {
    items
        .iter()
        .map(|s| fold(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Jaccard similarity of two label sets.
///
/// Symmetric and bounded to `[0, 1]`. Two empty sets are identical and
/// score `1.0`. Duplicates and case differences are ignored.
///
/// ```rust
/// use rhizome_core::similarity::jaccard;
///
/// let a = ["consciousness", "emergence"];
/// let b = ["consciousness", "systems", "complexity"];
/// assert!((jaccard(&a, &b) - 0.25).abs() < 1e-9);
/// ```
pub fn jaccard<S: AsRef<str>, T: AsRef<str>>(a: &[S], b: &[T]) -> f64 {
    let set_a = label_set(a);
    let set_b = label_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Labels present in both sets, in `a`'s first-seen order.
pub fn shared_labels<S: AsRef<str>, T: AsRef<str>>(a: &[S], b: &[T]) -> Vec<String> {
    let set_b = label_set(b);
    let mut seen = HashSet::new();
    a.iter()
        .map(|s| fold(s.as_ref()))
        .filter(|s| set_b.contains(s) && seen.insert(s.clone()))
        .collect()
}

/// Levenshtein edit distance using two rolling rows.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Normalized edit similarity: `1 - distance / max_len`, in `[0, 1]`.
pub fn similarity_ratio(a: &[char], b: &[char]) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_jaccard_both_empty_is_one() {
        let empty: [&str; 0] = [];
        assert_eq!(jaccard(&empty, &empty), 1.0);
    }

    #[test]
    fn test_jaccard_one_empty_is_zero() {
        let empty: [&str; 0] = [];
        assert_eq!(jaccard(&["a"], &empty), 0.0);
    }

    #[test]
    fn test_jaccard_two_thirds() {
        let a = ["consciousness", "emergence"];
        let b = ["consciousness", "emergence", "complexity"];
        assert!((jaccard(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_ignores_case_and_duplicates() {
        let a = ["Emergence", "emergence "];
        let b = ["emergence"];
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn test_shared_labels_order() {
        let a = ["b", "a", "c"];
        let b = ["c", "b"];
        assert_eq!(shared_labels(&a, &b), vec!["b", "c"]);
    }

    #[test]
    fn test_levenshtein_known() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn test_similarity_ratio_bounds() {
        assert_eq!(similarity_ratio(&[], &[]), 1.0);
        assert_eq!(similarity_ratio(&chars("abc"), &chars("xyz")), 0.0);
        let r = similarity_ratio(&chars("colour"), &chars("color"));
        assert!(r > 0.8 && r < 1.0);
    }
}
