//! Contradiction detection: the same concepts discussed with opposing stance.
//!
//! A candidate is eligible only when at least one of its emotional tones
//! opposes one of the source's tones and the concept sets are nearly the
//! same. Strength is the concept similarity.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{default_max_results, rank_and_cap, Engine, CONTRADICTION_DETECTION};
use crate::models::{Chunk, EngineResult, Explanation, RelationType, RequiredField};
use crate::similarity::{jaccard, shared_labels};

/// Symmetric opposition pairs over tone labels.
const OPPOSING_TONES: [(&str, &str); 4] = [
    ("critical", "affirmative"),
    ("skeptical", "confident"),
    ("pessimistic", "optimistic"),
    ("confrontational", "conciliatory"),
];

/// Whether two tone labels oppose each other (either direction, case-insensitive).
pub fn tones_oppose(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    OPPOSING_TONES
        .iter()
        .any(|(x, y)| (a == *x && b == *y) || (a == *y && b == *x))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionConfig {
    #[serde(default = "default_min_concept_similarity")]
    pub min_concept_similarity: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_min_concept_similarity() -> f64 {
    0.7
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            min_concept_similarity: default_min_concept_similarity(),
            max_results: default_max_results(),
        }
    }
}

pub struct ContradictionEngine {
    config: ContradictionConfig,
}

impl ContradictionEngine {
    pub fn new(config: ContradictionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Engine for ContradictionEngine {
    fn name(&self) -> &str {
        CONTRADICTION_DETECTION
    }

    fn required_fields(&self) -> &[RequiredField] {
        &[RequiredField::Concepts, RequiredField::EmotionalTones]
    }

    async fn detect(&self, chunk: &Chunk, candidates: &[Chunk]) -> Result<Vec<EngineResult>> {
        let source = &chunk.profile;
        let source_concepts: Vec<&str> = source.concepts.iter().map(|c| c.text.as_str()).collect();

        let mut results = Vec::new();
        for candidate in candidates {
            if candidate.id == chunk.id || candidate.profile.concepts.is_empty() {
                continue;
            }
            let target = &candidate.profile;

            let opposing_tones: Vec<(String, String)> = source
                .emotional_tones
                .iter()
                .flat_map(|s| {
                    target
                        .emotional_tones
                        .iter()
                        .filter(move |t| tones_oppose(s, t))
                        .map(move |t| (s.clone(), t.clone()))
                })
                .collect();
            if opposing_tones.is_empty() {
                continue;
            }

            let target_concepts: Vec<&str> =
                target.concepts.iter().map(|c| c.text.as_str()).collect();
            let concept_similarity = jaccard(&source_concepts, &target_concepts);
            if concept_similarity < self.config.min_concept_similarity {
                continue;
            }

            let polarity_gap = match (source.polarity, target.polarity) {
                (Some(a), Some(b)) => Some((a - b).abs()),
                _ => None,
            };

            results.push(EngineResult {
                source_chunk_id: chunk.id.clone(),
                target_chunk_id: candidate.id.clone(),
                relation_type: RelationType::Contradiction,
                raw_strength: concept_similarity,
                engine_name: CONTRADICTION_DETECTION.to_string(),
                explanation: Explanation::Contradiction {
                    shared_concepts: shared_labels(&source_concepts, &target_concepts),
                    opposing_tones,
                    concept_similarity,
                    polarity_gap,
                },
            });
        }
        Ok(rank_and_cap(results, self.config.max_results))
    }
}
