//! Core data models that flow through the connection pipeline.
//!
//! Chunks and anchors are immutable inputs produced upstream. Match
//! results and chunk metadata are derived once per processing run.
//! Engine results are transient; [`Connection`] is the only record that
//! leaves the pipeline for long-term storage.
//!
//! All offsets are character (not byte) positions into the same
//! canonical document text.

use serde::{Deserialize, Serialize};

/// A semantically-bounded unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// Inclusive start (character offset into the canonical text).
    pub start_offset: usize,
    /// Exclusive end (character offset into the canonical text).
    pub end_offset: usize,
    pub chunk_index: i64,
    /// Structural metadata attached by the metadata transfer stage.
    #[serde(default)]
    pub metadata: Option<ChunkMetadata>,
    /// Semantic metadata supplied by upstream extraction.
    #[serde(default)]
    pub profile: SemanticProfile,
}

impl Chunk {
    /// Length of the chunk's `[start_offset, end_offset)` interval.
    pub fn span_len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Whether the chunk carries a non-empty value for `field`.
    pub fn has_field(&self, field: RequiredField) -> bool {
        let p = &self.profile;
        match field {
            RequiredField::Embedding => p.embedding.as_ref().is_some_and(|e| !e.is_empty()),
            RequiredField::Themes => !p.themes.is_empty(),
            RequiredField::StructuralPatterns => !p.structural_patterns.is_empty(),
            RequiredField::Concepts => !p.concepts.is_empty(),
            RequiredField::EmotionalTones => !p.emotional_tones.is_empty(),
        }
    }
}

/// Semantic metadata extracted per chunk by an upstream collaborator.
///
/// Every field is optional in the input; engines declare which ones they
/// need through [`RequiredField`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticProfile {
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub structural_patterns: Vec<String>,
    #[serde(default)]
    pub emotional_tones: Vec<String>,
    /// Overall intellectual/narrative weight in `[0, 1]`.
    #[serde(default)]
    pub importance: Option<f64>,
    /// Stance from -1.0 (critical) to +1.0 (affirming).
    #[serde(default)]
    pub polarity: Option<f64>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// A key concept with its importance weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub text: String,
    #[serde(default)]
    pub importance: f64,
}

/// Chunk profile fields an engine may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Embedding,
    Themes,
    StructuralPatterns,
    Concepts,
    EmotionalTones,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::Embedding => "embedding",
            RequiredField::Themes => "themes",
            RequiredField::StructuralPatterns => "structural_patterns",
            RequiredField::Concepts => "concepts",
            RequiredField::EmotionalTones => "emotional_tones",
        }
    }
}

/// A page-space rectangle produced by layout extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A structurally-extracted unit of text (heading/page anchored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub text: String,
    /// Position in the extractor's own output; used only for ordering
    /// and for estimating where the anchor should land.
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub heading_path: Vec<String>,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub page_end: Option<u32>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(default)]
    pub section_marker: Option<String>,
}

/// How an anchor was placed into the chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    High,
    Medium,
    Synthetic,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::High => "high",
            MatchConfidence::Medium => "medium",
            MatchConfidence::Synthetic => "synthetic",
        }
    }
}

/// The mapper's claim that an anchor occupies `[start_offset, end_offset)`
/// of the chunk stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub anchor_id: String,
    /// The chunk holding the largest share of the matched interval.
    pub chunk_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub confidence: MatchConfidence,
}

/// Grade attached to transferred structural metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataConfidence {
    High,
    Medium,
    Low,
}

impl MetadataConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataConfidence::High => "high",
            MetadataConfidence::Medium => "medium",
            MetadataConfidence::Low => "low",
        }
    }
}

/// Structural metadata aggregated onto a chunk from overlapping anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Union of heading paths, order-preserving, first-seen.
    pub heading_path: Vec<String>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub section_marker: Option<String>,
    pub overlap_count: usize,
    pub confidence: MetadataConfidence,
    pub interpolated: bool,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            heading_path: Vec::new(),
            page_start: None,
            page_end: None,
            bounding_boxes: Vec::new(),
            section_marker: None,
            overlap_count: 0,
            confidence: MetadataConfidence::Low,
            interpolated: true,
        }
    }
}

/// The closed set of relationship kinds the engines can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    SemanticSimilarity,
    CrossDomainBridge,
    StructuralIsomorphism,
    Contradiction,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::SemanticSimilarity => "semantic_similarity",
            RelationType::CrossDomainBridge => "cross_domain_bridge",
            RelationType::StructuralIsomorphism => "structural_isomorphism",
            RelationType::Contradiction => "contradiction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic_similarity" => Some(RelationType::SemanticSimilarity),
            "cross_domain_bridge" => Some(RelationType::CrossDomainBridge),
            "structural_isomorphism" => Some(RelationType::StructuralIsomorphism),
            "contradiction" => Some(RelationType::Contradiction),
            _ => None,
        }
    }
}

/// Per-relation explanation of why an engine emitted a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Explanation {
    SemanticSimilarity {
        similarity: f64,
    },
    ThematicBridge {
        shared_themes: Vec<String>,
        theme_overlap: f64,
        domain_distance: f64,
        source_domain: Option<String>,
        target_domain: Option<String>,
    },
    StructuralIsomorphism {
        shared_patterns: Vec<String>,
        similarity: f64,
    },
    Contradiction {
        shared_concepts: Vec<String>,
        opposing_tones: Vec<(String, String)>,
        concept_similarity: f64,
        polarity_gap: Option<f64>,
    },
}

/// One engine's claim about one (source, target) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub relation_type: RelationType,
    /// Strength in `[0, 1]` before weighting.
    pub raw_strength: f64,
    pub engine_name: String,
    pub explanation: Explanation,
}

/// A weighted, ranked relationship ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub relation_type: RelationType,
    pub weighted_score: f64,
    pub raw_strength: f64,
    pub engine_name: String,
    pub metadata: Explanation,
}
