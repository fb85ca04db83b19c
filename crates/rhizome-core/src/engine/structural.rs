//! Structural isomorphism: chunks that argue or narrate in the same shape.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{default_max_results, rank_and_cap, Engine, STRUCTURAL_ISOMORPHISM};
use crate::models::{Chunk, EngineResult, Explanation, RelationType, RequiredField};
use crate::similarity::{jaccard, shared_labels};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralIsomorphismConfig {
    /// Minimum pattern-set Jaccard similarity.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_threshold() -> f64 {
    0.6
}

impl Default for StructuralIsomorphismConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_results: default_max_results(),
        }
    }
}

pub struct StructuralIsomorphismEngine {
    config: StructuralIsomorphismConfig,
}

impl StructuralIsomorphismEngine {
    pub fn new(config: StructuralIsomorphismConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Engine for StructuralIsomorphismEngine {
    fn name(&self) -> &str {
        STRUCTURAL_ISOMORPHISM
    }

    fn required_fields(&self) -> &[RequiredField] {
        &[RequiredField::StructuralPatterns]
    }

    async fn detect(&self, chunk: &Chunk, candidates: &[Chunk]) -> Result<Vec<EngineResult>> {
        let patterns = &chunk.profile.structural_patterns;
        let mut results = Vec::new();
        for candidate in candidates {
            let other = &candidate.profile.structural_patterns;
            // Two empty sets are "identical" under Jaccard; that is not a structural match.
            if candidate.id == chunk.id || other.is_empty() {
                continue;
            }
            let similarity = jaccard(patterns, other);
            if similarity < self.config.threshold {
                continue;
            }
            results.push(EngineResult {
                source_chunk_id: chunk.id.clone(),
                target_chunk_id: candidate.id.clone(),
                relation_type: RelationType::StructuralIsomorphism,
                raw_strength: similarity,
                engine_name: STRUCTURAL_ISOMORPHISM.to_string(),
                explanation: Explanation::StructuralIsomorphism {
                    shared_patterns: shared_labels(patterns, other),
                    similarity,
                },
            });
        }
        Ok(rank_and_cap(results, self.config.max_results))
    }
}
