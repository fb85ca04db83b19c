use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use rhizome::config::{Config, OrchestratorConfig, PersistenceConfig};
use rhizome::orchestrator::{Limits, Orchestrator};
use rhizome::pipeline::{DocumentInput, Pipeline};
use rhizome_core::embedding::EmbeddingProvider;
use rhizome_core::engine::{build_engines, Engine, EnginesConfig, ENGINE_NAMES};
use rhizome_core::error::{PipelineError, Stage};
use rhizome_core::mapper::{CoordinateMapper, MapperConfig};
use rhizome_core::models::{
    Anchor, Chunk, Concept, EngineResult, Explanation, MatchConfidence, MetadataConfidence,
    RelationType, RequiredField, SemanticProfile,
};
use rhizome_core::store::memory::InMemoryStore;
use rhizome_core::store::ConnectionStore;
use rhizome_core::transfer::TransferConfig;

// ============ Fixtures ============

struct Passage {
    id: &'static str,
    text: &'static str,
    profile: SemanticProfile,
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn concepts(items: &[&str]) -> Vec<Concept> {
    items
        .iter()
        .map(|s| Concept {
            text: s.to_string(),
            importance: 0.8,
        })
        .collect()
}

/// Lay passages end to end so offsets form one canonical text.
fn chunks(document_id: &str, passages: Vec<Passage>) -> Vec<Chunk> {
    let mut offset = 0;
    passages
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let len = p.text.chars().count();
            let chunk = Chunk {
                id: p.id.to_string(),
                document_id: document_id.to_string(),
                text: p.text.to_string(),
                start_offset: offset,
                end_offset: offset + len,
                chunk_index: i as i64,
                metadata: None,
                profile: p.profile,
            };
            offset += len;
            chunk
        })
        .collect()
}

fn anchor(id: &str, text: &str, start: usize, heading: &[&str], page: u32) -> Anchor {
    Anchor {
        id: id.to_string(),
        text: text.to_string(),
        start_offset: start,
        end_offset: start + text.chars().count(),
        heading_path: labels(heading),
        page_start: Some(page),
        page_end: Some(page),
        bounding_boxes: Vec::new(),
        section_marker: None,
    }
}

const EMERGENCE: &str = "Emergence shows how simple parts build complex wholes. ";
const STEW: &str = "A good stew needs patience and salt. ";
const PROGRESS: &str = "Progress in technology will lift everyone.";

fn book() -> DocumentInput {
    let chunks = chunks(
        "book",
        vec![
            Passage {
                id: "book-0",
                text: EMERGENCE,
                profile: SemanticProfile {
                    themes: labels(&["emergence", "networks"]),
                    structural_patterns: labels(&["argument", "definition"]),
                    domain: Some("philosophy".to_string()),
                    importance: Some(0.8),
                    ..Default::default()
                },
            },
            Passage {
                id: "book-1",
                text: STEW,
                profile: SemanticProfile {
                    themes: labels(&["cooking"]),
                    structural_patterns: labels(&["recipe"]),
                    ..Default::default()
                },
            },
            Passage {
                id: "book-2",
                text: PROGRESS,
                profile: SemanticProfile {
                    themes: labels(&["progress", "technology"]),
                    structural_patterns: labels(&["argument", "narrative"]),
                    concepts: concepts(&["progress"]),
                    emotional_tones: labels(&["optimistic"]),
                    polarity: Some(0.7),
                    ..Default::default()
                },
            },
        ],
    );
    let stew_at = EMERGENCE.chars().count();
    let progress_at = stew_at + STEW.chars().count();
    let anchors = vec![
        anchor("a0", EMERGENCE.trim(), 0, &["Part I", "Emergence"], 1),
        anchor("a1", STEW.trim(), stew_at, &["Part I", "Interlude"], 2),
        anchor("a2", PROGRESS, progress_at, &["Part II"], 3),
    ];
    DocumentInput {
        document_id: "book".to_string(),
        chunks,
        anchors,
    }
}

fn library() -> Vec<Chunk> {
    chunks(
        "library",
        vec![
            Passage {
                id: "lib-bridge",
                text: "Ant colonies route food without a planner.",
                profile: SemanticProfile {
                    themes: labels(&["emergence", "networks", "ecology"]),
                    structural_patterns: labels(&["case_study", "data"]),
                    domain: Some("biology".to_string()),
                    importance: Some(0.9),
                    ..Default::default()
                },
            },
            Passage {
                id: "lib-contra",
                text: "Technology mostly concentrates gains.",
                profile: SemanticProfile {
                    themes: labels(&["progress", "technology"]),
                    structural_patterns: labels(&["argument", "narrative"]),
                    concepts: concepts(&["progress"]),
                    emotional_tones: labels(&["pessimistic"]),
                    polarity: Some(-0.6),
                    ..Default::default()
                },
            },
            Passage {
                id: "lib-weak",
                text: "A sonnet about rivers.",
                profile: SemanticProfile {
                    themes: labels(&["emergence", "rivers", "love"]),
                    structural_patterns: labels(&["poetry"]),
                    importance: Some(0.9),
                    ..Default::default()
                },
            },
        ],
    )
}

fn pipeline() -> Pipeline {
    let engines = build_engines(&ENGINE_NAMES, &EnginesConfig::default()).unwrap();
    let limits = Limits::from_config(&OrchestratorConfig::default());
    let orchestrator = Orchestrator::new(engines, Default::default(), limits).unwrap();
    Pipeline::new(
        CoordinateMapper::new(MapperConfig::default()),
        TransferConfig::default(),
        orchestrator,
        PersistenceConfig::default(),
    )
}

struct UnitEmbedder;

#[async_trait]
impl EmbeddingProvider for UnitEmbedder {
    fn model_name(&self) -> &str {
        "unit"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

/// Links every chunk to `lib-bridge`, stalling on one chunk when asked.
struct LinkEngine {
    stall_on: Option<&'static str>,
}

#[async_trait]
impl Engine for LinkEngine {
    fn name(&self) -> &str {
        "link"
    }

    fn required_fields(&self) -> &[RequiredField] {
        &[]
    }

    async fn detect(&self, chunk: &Chunk, _candidates: &[Chunk]) -> Result<Vec<EngineResult>> {
        if self.stall_on == Some(chunk.id.as_str()) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(vec![EngineResult {
            source_chunk_id: chunk.id.clone(),
            target_chunk_id: "lib-bridge".to_string(),
            relation_type: RelationType::SemanticSimilarity,
            raw_strength: 0.5,
            engine_name: "link".to_string(),
            explanation: Explanation::SemanticSimilarity { similarity: 0.5 },
        }])
    }
}

fn link_pipeline(stall_on: Option<&'static str>) -> Pipeline {
    let mut limits = Limits::from_config(&OrchestratorConfig::default());
    limits.run_deadline = Duration::from_millis(300);
    limits.engine_timeout = Duration::from_secs(60);
    let engines: Vec<Arc<dyn Engine>> = vec![Arc::new(LinkEngine { stall_on })];
    let orchestrator = Orchestrator::new(engines, Default::default(), limits).unwrap();
    Pipeline::new(
        CoordinateMapper::new(MapperConfig::default()),
        TransferConfig::default(),
        orchestrator,
        PersistenceConfig::default(),
    )
}

// ============ Mapping and transfer ============

#[tokio::test]
async fn test_map_document_transfers_headings() {
    let mapped = pipeline().map_document(&book()).await.unwrap();

    assert_eq!(mapped.mapping.exact, 3);
    assert_eq!(mapped.transfer.coverage, 1.0);
    assert!(mapped.matches.iter().all(|m| m.confidence == MatchConfidence::Exact));

    let first = mapped.chunks[0].metadata.as_ref().unwrap();
    assert_eq!(first.heading_path, labels(&["Part I", "Emergence"]));
    assert_eq!(first.page_start, Some(1));
    assert!(!first.interpolated);

    let last = mapped.chunks[2].metadata.as_ref().unwrap();
    assert_eq!(last.heading_path, labels(&["Part II"]));
    assert_ne!(last.confidence, MetadataConfidence::Low);
}

#[tokio::test]
async fn test_unfound_anchor_is_interpolated() {
    let mut doc = book();
    doc.anchors
        .push(anchor("ghost", "Volcanic glass forms when lava cools quickly", 200, &["Appendix"], 9));

    let mapped = pipeline().map_document(&doc).await.unwrap();
    assert_eq!(mapped.matches.len(), 4);
    assert_eq!(mapped.mapping.interpolated, 1);
    let ghost = mapped.matches.iter().find(|m| m.anchor_id == "ghost").unwrap();
    assert_eq!(ghost.confidence, MatchConfidence::Synthetic);
}

#[tokio::test]
async fn test_anchors_without_chunks_fail_in_mapping() {
    let mut doc = book();
    doc.chunks.clear();

    let err = pipeline()
        .process_document(&doc, &[], &InMemoryStore::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyChunkStream { .. }));
    assert_eq!(err.stage(), Stage::Mapping);
}

// ============ Detection and persistence ============

#[tokio::test]
async fn test_end_to_end_detects_and_persists() {
    let store = InMemoryStore::new();
    let outcome = pipeline()
        .process_document(&book(), &library(), &store)
        .await
        .unwrap();

    let found: Vec<(&str, &str, RelationType)> = outcome
        .connections
        .iter()
        .map(|c| (c.source_chunk_id.as_str(), c.target_chunk_id.as_str(), c.relation_type))
        .collect();

    // Two of three themes shared across domains: a bridge.
    assert!(found.contains(&("book-0", "lib-bridge", RelationType::CrossDomainBridge)));
    // One of four themes shared: below the overlap floor.
    assert!(!found.iter().any(|(_, target, _)| *target == "lib-weak"));
    // Same concept, opposing tone.
    assert!(found.contains(&("book-2", "lib-contra", RelationType::Contradiction)));
    assert!(found.contains(&("book-2", "lib-contra", RelationType::StructuralIsomorphism)));
    assert_eq!(found.len(), 3);

    let bridge = outcome
        .connections
        .iter()
        .find(|c| c.relation_type == RelationType::CrossDomainBridge)
        .unwrap();
    assert!((bridge.raw_strength - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(outcome.report.connections, 3);
    assert_eq!(outcome.report.persistence.rows_written, 3);
    assert_eq!(store.len(), 3);
    assert_eq!(store.connections_for("book-2", 10).await.unwrap().len(), 2);

    // No embeddings anywhere: the semantic engine never runs.
    let semantic = outcome.report.engines.get("semantic_similarity").unwrap();
    assert_eq!(semantic.invocations, 0);
    assert_eq!(semantic.skipped, 3);
}

#[tokio::test]
async fn test_rerun_replaces_previous_connections() {
    let store = InMemoryStore::new();
    let p = pipeline();
    p.process_document(&book(), &library(), &store).await.unwrap();
    p.process_document(&book(), &library(), &store).await.unwrap();
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_deadline_rerun_keeps_rows_of_unfinished_chunks() {
    let store = InMemoryStore::new();
    link_pipeline(None)
        .process_document(&book(), &library(), &store)
        .await
        .unwrap();
    assert_eq!(store.len(), 3);

    let outcome = link_pipeline(Some("book-1"))
        .process_document(&book(), &library(), &store)
        .await
        .unwrap();
    assert!(outcome.report.deadline_exceeded);
    assert_eq!(outcome.report.chunks_completed, 2);

    // book-1 never finished the second run; its first-run row stays.
    assert_eq!(store.connections_for("book-1", 10).await.unwrap().len(), 1);
    assert_eq!(store.connections_for("book-0", 10).await.unwrap().len(), 1);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_embedding_backfill_enables_semantic_engine() {
    let store = InMemoryStore::new();
    let p = pipeline().with_embedder(Arc::new(UnitEmbedder), 2);
    let outcome = p.process_document(&book(), &library(), &store).await.unwrap();

    assert_eq!(outcome.report.embedded_chunks, 3);
    let semantic = outcome
        .connections
        .iter()
        .filter(|c| c.relation_type == RelationType::SemanticSimilarity)
        .count();
    // Each book chunk matches the other two; library chunks carry no vector.
    assert_eq!(semantic, 6);
}

#[tokio::test]
async fn test_embedding_outage_is_not_fatal() {
    let store = InMemoryStore::new();
    let p = pipeline().with_embedder(Arc::new(DownEmbedder), 8);
    let outcome = p.process_document(&book(), &library(), &store).await.unwrap();

    assert_eq!(outcome.report.embedded_chunks, 0);
    assert_eq!(outcome.connections.len(), 3);
}

#[tokio::test]
async fn test_persistence_failure_is_reported_not_raised() {
    let store = InMemoryStore::new();
    store.fail_next_inserts(2);
    let outcome = pipeline()
        .process_document(&book(), &library(), &store)
        .await
        .unwrap();

    assert_eq!(outcome.connections.len(), 3);
    assert_eq!(outcome.report.persistence.batches_failed, 1);
    assert_eq!(outcome.report.persistence.rows_failed, 3);
    assert!(store.is_empty());
}

// ============ Configuration ============

#[test]
fn test_from_config_builds_with_locator() {
    let config: Config = toml::from_str(
        r#"
        [db]
        path = "x.sqlite"

        [locator]
        provider = "ollama"
        model = "llama3.2"
        url = "http://127.0.0.1:9"
        "#,
    )
    .unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.orchestrator().engine_names().len(), 4);

    let mut broken = config.clone();
    broken.locator.model = None;
    assert!(Pipeline::from_config(&broken).is_err());
}
