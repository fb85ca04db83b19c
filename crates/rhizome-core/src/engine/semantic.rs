//! Semantic similarity: cosine similarity between chunk embeddings.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{default_max_results, rank_and_cap, Engine, SEMANTIC_SIMILARITY};
use crate::embedding::cosine_similarity;
use crate::models::{Chunk, EngineResult, Explanation, RelationType, RequiredField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSimilarityConfig {
    /// Minimum cosine similarity to emit a result.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_threshold() -> f64 {
    0.7
}

impl Default for SemanticSimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_results: default_max_results(),
        }
    }
}

pub struct SemanticSimilarityEngine {
    config: SemanticSimilarityConfig,
}

impl SemanticSimilarityEngine {
    pub fn new(config: SemanticSimilarityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Engine for SemanticSimilarityEngine {
    fn name(&self) -> &str {
        SEMANTIC_SIMILARITY
    }

    fn required_fields(&self) -> &[RequiredField] {
        &[RequiredField::Embedding]
    }

    async fn detect(&self, chunk: &Chunk, candidates: &[Chunk]) -> Result<Vec<EngineResult>> {
        let Some(source) = chunk.profile.embedding.as_deref() else {
            return Ok(Vec::new());
        };
        if source.is_empty() || source.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("malformed embedding on {}", chunk.id);
        }

        let mut results = Vec::new();
        for candidate in candidates {
            if candidate.id == chunk.id {
                continue;
            }
            let Some(target) = candidate.profile.embedding.as_deref() else {
                continue;
            };
            if target.len() != source.len() {
                debug!(
                    chunk_id = %chunk.id,
                    candidate_id = %candidate.id,
                    source_dims = source.len(),
                    candidate_dims = target.len(),
                    "skipping candidate with mismatched embedding dimensions"
                );
                continue;
            }
            let similarity = f64::from(cosine_similarity(source, target)).clamp(0.0, 1.0);
            if similarity >= self.config.threshold {
                results.push(EngineResult {
                    source_chunk_id: chunk.id.clone(),
                    target_chunk_id: candidate.id.clone(),
                    relation_type: RelationType::SemanticSimilarity,
                    raw_strength: similarity,
                    engine_name: SEMANTIC_SIMILARITY.to_string(),
                    explanation: Explanation::SemanticSimilarity { similarity },
                });
            }
        }
        Ok(rank_and_cap(results, self.config.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticProfile;

    fn chunk(id: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: String::new(),
            start_offset: 0,
            end_offset: 0,
            chunk_index: 0,
            metadata: None,
            profile: SemanticProfile {
                embedding,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_similar_embeddings_connect() {
        let engine = SemanticSimilarityEngine::new(SemanticSimilarityConfig::default());
        let source = chunk("s", Some(vec![1.0, 0.0]));
        let pool = vec![
            chunk("near", Some(vec![0.9, 0.1])),
            chunk("far", Some(vec![0.0, 1.0])),
            chunk("none", None),
            chunk("s", Some(vec![1.0, 0.0])),
        ];
        let results = engine.detect(&source, &pool).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target_chunk_id, "near");
        assert_eq!(results[0].relation_type, RelationType::SemanticSimilarity);
        assert!(results[0].raw_strength > 0.99);
    }

    #[tokio::test]
    async fn test_mismatched_candidate_is_skipped() {
        let engine = SemanticSimilarityEngine::new(SemanticSimilarityConfig::default());
        let source = chunk("s", Some(vec![1.0, 0.0]));
        let pool = vec![
            chunk("good", Some(vec![1.0, 0.0])),
            chunk("legacy", Some(vec![1.0, 0.0, 0.0])),
        ];
        let results = engine.detect(&source, &pool).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target_chunk_id, "good");
    }

    #[tokio::test]
    async fn test_malformed_source_embedding_is_an_error() {
        let engine = SemanticSimilarityEngine::new(SemanticSimilarityConfig::default());
        let source = chunk("s", Some(vec![f32::NAN, 0.0]));
        let pool = vec![chunk("t", Some(vec![1.0, 0.0]))];
        assert!(engine.detect(&source, &pool).await.is_err());
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let engine = SemanticSimilarityEngine::new(SemanticSimilarityConfig {
            threshold: 0.0,
            max_results: 3,
        });
        let source = chunk("s", Some(vec![1.0, 0.0]));
        let pool: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("t{i}"), Some(vec![1.0, i as f32 * 0.1])))
            .collect();
        let results = engine.detect(&source, &pool).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.target_chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2"]);
    }
}
