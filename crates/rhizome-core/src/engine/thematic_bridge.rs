//! Thematic bridge: same themes, different structural domain.
//!
//! `theme_overlap = jaccard(themes)` and
//! `domain_distance = 1 - jaccard(structural_patterns)`. A pair is a
//! bridge when both clear their floors; strength is their product, so the
//! engine rewards cross-domain pairs over same-domain repetition.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{default_max_results, rank_and_cap, Engine, THEMATIC_BRIDGE};
use crate::models::{Chunk, EngineResult, Explanation, RelationType, RequiredField};
use crate::similarity::{jaccard, shared_labels};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThematicBridgeConfig {
    #[serde(default = "default_min_theme_overlap")]
    pub min_theme_overlap: f64,
    #[serde(default = "default_min_domain_distance")]
    pub min_domain_distance: f64,
    /// Chunks whose known importance is below this are not bridged.
    #[serde(default = "default_min_importance")]
    pub min_importance: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_min_theme_overlap() -> f64 {
    0.5
}

fn default_min_domain_distance() -> f64 {
    0.6
}

fn default_min_importance() -> f64 {
    0.6
}

impl Default for ThematicBridgeConfig {
    fn default() -> Self {
        Self {
            min_theme_overlap: default_min_theme_overlap(),
            min_domain_distance: default_min_domain_distance(),
            min_importance: default_min_importance(),
            max_results: default_max_results(),
        }
    }
}

pub struct ThematicBridgeEngine {
    config: ThematicBridgeConfig,
}

impl ThematicBridgeEngine {
    pub fn new(config: ThematicBridgeConfig) -> Self {
        Self { config }
    }

    /// Unscored chunks pass; scored ones must reach `min_importance`.
    fn important_enough(&self, chunk: &Chunk) -> bool {
        chunk
            .profile
            .importance
            .map_or(true, |i| i >= self.config.min_importance)
    }
}

#[async_trait]
impl Engine for ThematicBridgeEngine {
    fn name(&self) -> &str {
        THEMATIC_BRIDGE
    }

    fn required_fields(&self) -> &[RequiredField] {
        &[RequiredField::Themes, RequiredField::StructuralPatterns]
    }

    async fn detect(&self, chunk: &Chunk, candidates: &[Chunk]) -> Result<Vec<EngineResult>> {
        if !self.important_enough(chunk) {
            return Ok(Vec::new());
        }
        let source = &chunk.profile;

        let mut results = Vec::new();
        for candidate in candidates {
            if candidate.id == chunk.id
                || candidate.profile.themes.is_empty()
                || !self.important_enough(candidate)
            {
                continue;
            }
            let target = &candidate.profile;

            let theme_overlap = jaccard(&source.themes, &target.themes);
            if theme_overlap < self.config.min_theme_overlap {
                continue;
            }
            let domain_distance =
                1.0 - jaccard(&source.structural_patterns, &target.structural_patterns);
            if domain_distance < self.config.min_domain_distance {
                continue;
            }

            results.push(EngineResult {
                source_chunk_id: chunk.id.clone(),
                target_chunk_id: candidate.id.clone(),
                relation_type: RelationType::CrossDomainBridge,
                raw_strength: theme_overlap * domain_distance,
                engine_name: THEMATIC_BRIDGE.to_string(),
                explanation: Explanation::ThematicBridge {
                    shared_themes: shared_labels(&source.themes, &target.themes),
                    theme_overlap,
                    domain_distance,
                    source_domain: source.domain.clone(),
                    target_domain: target.domain.clone(),
                },
            });
        }
        Ok(rank_and_cap(results, self.config.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticProfile;

    fn chunk(id: &str, themes: &[&str], patterns: &[&str]) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: String::new(),
            start_offset: 0,
            end_offset: 0,
            chunk_index: 0,
            metadata: None,
            profile: SemanticProfile {
                themes: themes.iter().map(|t| t.to_string()).collect(),
                structural_patterns: patterns.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_low_theme_overlap_rejected() {
        let engine = ThematicBridgeEngine::new(ThematicBridgeConfig::default());
        let a = chunk("a", &["consciousness", "emergence"], &["dialectical"]);
        let b = chunk("b", &["consciousness", "systems", "complexity"], &["empirical"]);
        let results = engine.detect(&a, &[b]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_cross_domain_bridge_accepted() {
        let engine = ThematicBridgeEngine::new(ThematicBridgeConfig::default());
        let a = chunk("a", &["consciousness", "emergence"], &["dialectical"]);
        let b = chunk("b", &["consciousness", "emergence", "complexity"], &["empirical"]);
        let results = engine.detect(&a, &[b]).await.unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.relation_type.as_str(), "cross_domain_bridge");
        assert!((r.raw_strength - 2.0 / 3.0).abs() < 1e-9);
        match &r.explanation {
            Explanation::ThematicBridge {
                shared_themes,
                domain_distance,
                ..
            } => {
                assert_eq!(shared_themes, &vec!["consciousness".to_string(), "emergence".to_string()]);
                assert_eq!(*domain_distance, 1.0);
            }
            other => panic!("unexpected explanation {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_domain_rejected() {
        let engine = ThematicBridgeEngine::new(ThematicBridgeConfig::default());
        let a = chunk("a", &["freedom"], &["dialectical"]);
        let b = chunk("b", &["freedom"], &["dialectical"]);
        assert!(engine.detect(&a, &[b]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_importance_gate() {
        let engine = ThematicBridgeEngine::new(ThematicBridgeConfig::default());
        let a = chunk("a", &["freedom"], &["dialectical"]);
        let mut minor = chunk("minor", &["freedom"], &["narrative"]);
        minor.profile.importance = Some(0.2);
        let mut major = chunk("major", &["freedom"], &["narrative"]);
        major.profile.importance = Some(0.8);
        let results = engine.detect(&a, &[minor, major]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target_chunk_id, "major");
    }
}
