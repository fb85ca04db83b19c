//! Detection engines: pluggable algorithms that propose relationships
//! between one chunk and a pool of candidate chunks.
//!
//! # Architecture
//!
//! ```text
//!            (chunk, candidates)
//!                    │
//!   ┌────────────────┼──────────────────┬─────────────────┐
//!   ▼                ▼                  ▼                 ▼
//! semantic_     thematic_bridge   structural_     contradiction_
//! similarity                      isomorphism     detection
//!   │                │                  │                 │
//!   └────────────────┴───────┬──────────┴─────────────────┘
//!                            ▼
//!                Vec<EngineResult> per engine
//! ```
//!
//! Engines are pure functions of their inputs. They never mutate the
//! chunk or the pool, skip self-pairs, and cap their own output at
//! `max_results` ordered by `raw_strength`.

pub mod contradiction;
pub mod semantic;
pub mod structural;
pub mod thematic_bridge;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{Chunk, EngineResult, RequiredField};

pub use contradiction::{ContradictionConfig, ContradictionEngine};
pub use semantic::{SemanticSimilarityConfig, SemanticSimilarityEngine};
pub use structural::{StructuralIsomorphismConfig, StructuralIsomorphismEngine};
pub use thematic_bridge::{ThematicBridgeConfig, ThematicBridgeEngine};

pub const SEMANTIC_SIMILARITY: &str = "semantic_similarity";
pub const THEMATIC_BRIDGE: &str = "thematic_bridge";
pub const STRUCTURAL_ISOMORPHISM: &str = "structural_isomorphism";
pub const CONTRADICTION_DETECTION: &str = "contradiction_detection";

/// Every built-in engine name, in default tie-break order.
pub const ENGINE_NAMES: [&str; 4] = [
    SEMANTIC_SIMILARITY,
    THEMATIC_BRIDGE,
    STRUCTURAL_ISOMORPHISM,
    CONTRADICTION_DETECTION,
];

// ═══════════════════════════════════════════════════════════════════════
// Engine Trait
// ═══════════════════════════════════════════════════════════════════════

/// A relationship-detection algorithm.
///
/// # Contract
///
/// - `name()` is stable and unique; it keys weights and statistics.
/// - `required_fields()` lists the profile fields the *source* chunk must
///   carry. The orchestrator skips the engine without calling it when any
///   are missing. Candidates lacking a field are skipped by the engine.
/// - `detect()` must not mutate its inputs. Returning `Err` is treated as
///   an empty result for this engine only.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn required_fields(&self) -> &[RequiredField];

    async fn detect(&self, chunk: &Chunk, candidates: &[Chunk]) -> Result<Vec<EngineResult>>;
}

/// Whether `chunk` satisfies every field `engine` requires.
pub fn preconditions_met(engine: &dyn Engine, chunk: &Chunk) -> bool {
    engine.required_fields().iter().all(|f| chunk.has_field(*f))
}

/// Sort by `raw_strength` descending (stable) and keep the top `max`.
pub(crate) fn rank_and_cap(mut results: Vec<EngineResult>, max: usize) -> Vec<EngineResult> {
    results.sort_by(|a, b| b.raw_strength.total_cmp(&a.raw_strength));
    results.truncate(max);
    results
}

// ═══════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════

/// Per-engine tuning, one table per built-in engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub semantic_similarity: SemanticSimilarityConfig,
    #[serde(default)]
    pub thematic_bridge: ThematicBridgeConfig,
    #[serde(default)]
    pub structural_isomorphism: StructuralIsomorphismConfig,
    #[serde(default)]
    pub contradiction_detection: ContradictionConfig,
}

fn default_max_results() -> usize {
    20
}

fn check_unit(field: &str, v: f64) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig {
            reason: format!("engines.{field} must be in [0.0, 1.0], got {v}"),
        })
    }
}

fn check_max_results(engine: &str, v: usize) -> Result<(), PipelineError> {
    if v == 0 {
        return Err(PipelineError::InvalidConfig {
            reason: format!("engines.{engine}.max_results must be >= 1"),
        });
    }
    Ok(())
}

impl EnginesConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let s = &self.semantic_similarity;
        check_unit("semantic_similarity.threshold", s.threshold)?;
        check_max_results(SEMANTIC_SIMILARITY, s.max_results)?;

        let t = &self.thematic_bridge;
        check_unit("thematic_bridge.min_theme_overlap", t.min_theme_overlap)?;
        check_unit("thematic_bridge.min_domain_distance", t.min_domain_distance)?;
        check_unit("thematic_bridge.min_importance", t.min_importance)?;
        check_max_results(THEMATIC_BRIDGE, t.max_results)?;

        let st = &self.structural_isomorphism;
        check_unit("structural_isomorphism.threshold", st.threshold)?;
        check_max_results(STRUCTURAL_ISOMORPHISM, st.max_results)?;

        let c = &self.contradiction_detection;
        check_unit("contradiction_detection.min_concept_similarity", c.min_concept_similarity)?;
        check_max_results(CONTRADICTION_DETECTION, c.max_results)?;
        Ok(())
    }
}

/// Instantiate the named engines in the given order.
///
/// The order is preserved: it is the tie-break order for equal scores.
pub fn build_engines<S: AsRef<str>>(
    enabled: &[S],
    config: &EnginesConfig,
) -> Result<Vec<Arc<dyn Engine>>, PipelineError> {
    let mut engines: Vec<Arc<dyn Engine>> = Vec::with_capacity(enabled.len());
    for name in enabled {
        let engine: Arc<dyn Engine> = match name.as_ref() {
            SEMANTIC_SIMILARITY => Arc::new(SemanticSimilarityEngine::new(
                config.semantic_similarity.clone(),
            )),
            THEMATIC_BRIDGE => Arc::new(ThematicBridgeEngine::new(config.thematic_bridge.clone())),
            STRUCTURAL_ISOMORPHISM => Arc::new(StructuralIsomorphismEngine::new(
                config.structural_isomorphism.clone(),
            )),
            CONTRADICTION_DETECTION => Arc::new(ContradictionEngine::new(
                config.contradiction_detection.clone(),
            )),
            other => {
                return Err(PipelineError::InvalidConfig {
                    reason: format!(
                        "unknown engine '{other}'. Known engines: {}",
                        ENGINE_NAMES.join(", ")
                    ),
                })
            }
        };
        if engines.iter().any(|e| e.name() == engine.name()) {
            return Err(PipelineError::InvalidConfig {
                reason: format!("engine '{}' enabled more than once", engine.name()),
            });
        }
        engines.push(engine);
    }
    Ok(engines)
}
