//! Multi-engine orchestration.
//!
//! For one chunk, every engine whose preconditions hold runs concurrently
//! against the same candidate pool. Each call is isolated in its own task
//! with its own timeout; an error, timeout or panic empties that engine's
//! contribution and nothing else.
//!
//! Results are then weighted and capped twice:
//!
//! ```text
//! per engine:  weighted = raw × weight → sort desc → keep per_engine_limit
//! per chunk:   concat (engine order) → sort desc → keep per_chunk_limit
//! ```
//!
//! Sorts are stable, so equal scores keep engine order and then each
//! engine's own order. The same inputs and weights always produce the
//! same output.
//!
//! Across a document, chunks fan out under `max_concurrency`; a run-level
//! deadline aborts in-flight work and keeps what has completed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use rhizome_core::engine::{build_engines, preconditions_met, Engine};
use rhizome_core::error::PipelineError;
use rhizome_core::models::{Chunk, Connection, EngineResult};

use crate::config::{Config, OrchestratorConfig, MAX_ENGINE_CONCURRENCY};
use crate::report::{EngineOutcome, EngineStatsTable, EngineStatus};

/// Weighted, capped connections for one chunk plus how each engine fared.
#[derive(Debug, Clone)]
pub struct ChunkRun {
    pub chunk_id: String,
    pub connections: Vec<Connection>,
    pub outcomes: Vec<EngineOutcome>,
}

/// Connections for a whole document.
#[derive(Debug, Clone)]
pub struct DocumentRun {
    pub connections: Vec<Connection>,
    pub stats: EngineStatsTable,
    pub chunks_completed: usize,
    /// Chunks whose detection finished; aborted or panicked chunks are absent.
    pub completed_chunk_ids: Vec<String>,
    pub deadline_exceeded: bool,
}

/// Immutable orchestration settings, validated at construction.
#[derive(Debug, Clone)]
pub struct Limits {
    pub per_engine: usize,
    pub per_chunk: usize,
    pub engine_timeout: Duration,
    pub run_deadline: Duration,
    pub max_concurrency: usize,
    pub max_engine_concurrency: usize,
}

impl Limits {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            per_engine: config.per_engine_limit,
            per_chunk: config.per_chunk_limit,
            engine_timeout: Duration::from_millis(config.engine_timeout_ms),
            run_deadline: Duration::from_secs(config.run_deadline_secs),
            max_concurrency: config.max_concurrency,
            max_engine_concurrency: config.max_engine_concurrency,
        }
    }
}

pub struct Orchestrator {
    engines: Vec<Arc<dyn Engine>>,
    weights: HashMap<String, f64>,
    limits: Limits,
}

impl Orchestrator {
    /// Build from explicit engines; their order is the tie-break order.
    pub fn new(
        engines: Vec<Arc<dyn Engine>>,
        weights: HashMap<String, f64>,
        limits: Limits,
    ) -> Result<Self, PipelineError> {
        let invalid = |reason: String| Err(PipelineError::InvalidConfig { reason });
        if limits.per_engine == 0 || limits.per_chunk == 0 {
            return invalid("result limits must be >= 1".to_string());
        }
        if limits.max_concurrency == 0 {
            return invalid("max_concurrency must be >= 1".to_string());
        }
        if !(1..=MAX_ENGINE_CONCURRENCY).contains(&limits.max_engine_concurrency) {
            return invalid(format!(
                "max_engine_concurrency must be in [1, {MAX_ENGINE_CONCURRENCY}]"
            ));
        }
        for (name, w) in &weights {
            if !w.is_finite() || *w < 0.0 {
                return invalid(format!("weight for '{name}' must be finite and >= 0, got {w}"));
            }
        }
        Ok(Self {
            engines,
            weights,
            limits,
        })
    }

    /// Build the enabled built-in engines from application config.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let orch = &config.orchestrator;
        let engines = build_engines(&orch.enabled_engines, &config.engines)?;
        let weights = orch.weights.iter().map(|(k, v)| (k.clone(), *v)).collect();
        Self::new(engines, weights, Limits::from_config(orch))
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn weight(&self, engine: &str) -> f64 {
        self.weights.get(engine).copied().unwrap_or(1.0)
    }

    /// Detect, weight and rank connections for one chunk.
    ///
    /// Fails only when the candidate pool is empty or malformed.
    pub async fn run(
        &self,
        chunk: Arc<Chunk>,
        candidates: Arc<[Chunk]>,
    ) -> Result<ChunkRun, PipelineError> {
        validate_pool(&chunk, &candidates)?;

        let mut outcomes: Vec<Option<EngineOutcome>> = vec![None; self.engines.len()];
        let mut per_engine: Vec<Vec<EngineResult>> = vec![Vec::new(); self.engines.len()];

        let permits = Arc::new(Semaphore::new(self.limits.max_engine_concurrency));
        let mut set = JoinSet::new();
        let mut task_engine = HashMap::new();

        for (idx, engine) in self.engines.iter().enumerate() {
            if !preconditions_met(engine.as_ref(), &chunk) {
                debug!(engine = engine.name(), chunk_id = %chunk.id, "engine skipped: missing fields");
                outcomes[idx] = Some(EngineOutcome {
                    engine: engine.name().to_string(),
                    status: EngineStatus::Skipped,
                    latency: Duration::ZERO,
                    results: 0,
                });
                continue;
            }

            let engine = Arc::clone(engine);
            let chunk = Arc::clone(&chunk);
            let candidates = Arc::clone(&candidates);
            let permits = Arc::clone(&permits);
            let timeout = self.limits.engine_timeout;
            let handle = set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, engine.detect(&chunk, &candidates)).await;
                (idx, started.elapsed(), result)
            });
            task_engine.insert(handle.id(), idx);
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (idx, outcome) = match joined {
                Ok((_, (idx, latency, Ok(Ok(results))))) => {
                    let count = results.len();
                    per_engine[idx] = results;
                    (idx, (EngineStatus::Ok, latency, count))
                }
                Ok((_, (idx, latency, Ok(Err(e))))) => {
                    warn!(engine = self.engines[idx].name(), chunk_id = %chunk.id, error = %e, "engine failed");
                    (idx, (EngineStatus::Failed, latency, 0))
                }
                Ok((_, (idx, latency, Err(_)))) => {
                    warn!(
                        engine = self.engines[idx].name(),
                        chunk_id = %chunk.id,
                        timeout_ms = self.limits.engine_timeout.as_millis() as u64,
                        "engine timed out"
                    );
                    (idx, (EngineStatus::TimedOut, latency, 0))
                }
                Err(join_err) => {
                    let Some(&idx) = task_engine.get(&join_err.id()) else {
                        continue;
                    };
                    let status = if join_err.is_panic() {
                        EngineStatus::Panicked
                    } else {
                        EngineStatus::Failed
                    };
                    warn!(engine = self.engines[idx].name(), chunk_id = %chunk.id, error = %join_err, "engine task aborted");
                    (idx, (status, Duration::ZERO, 0))
                }
            };
            let (status, latency, results) = outcome;
            outcomes[idx] = Some(EngineOutcome {
                engine: self.engines[idx].name().to_string(),
                status,
                latency,
                results,
            });
        }

        let grouped: Vec<(f64, Vec<EngineResult>)> = self
            .engines
            .iter()
            .zip(per_engine)
            .map(|(engine, results)| (self.weight(engine.name()), results))
            .collect();
        let connections = merge_results(grouped, self.limits.per_engine, self.limits.per_chunk);

        Ok(ChunkRun {
            chunk_id: chunk.id.clone(),
            connections,
            outcomes: outcomes.into_iter().flatten().collect(),
        })
    }

    /// Run every chunk of a document against `candidates`.
    ///
    /// Chunks fan out under `max_concurrency`. When the run deadline
    /// passes, in-flight chunks are aborted and the connections gathered
    /// so far are returned with `deadline_exceeded` set. A fatal error on
    /// any chunk aborts the whole document.
    pub async fn run_document(
        self: &Arc<Self>,
        chunks: &[Chunk],
        candidates: Arc<[Chunk]>,
    ) -> Result<DocumentRun, PipelineError> {
        let mut run = DocumentRun {
            connections: Vec::new(),
            stats: EngineStatsTable::new(&self.engine_names()),
            chunks_completed: 0,
            completed_chunk_ids: Vec::new(),
            deadline_exceeded: false,
        };
        if chunks.is_empty() {
            return Ok(run);
        }

        let permits = Arc::new(Semaphore::new(self.limits.max_concurrency));
        let mut set = JoinSet::new();
        for chunk in chunks {
            let this = Arc::clone(self);
            let chunk = Arc::new(chunk.clone());
            let candidates = Arc::clone(&candidates);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                this.run(chunk, candidates).await
            });
        }

        let deadline = tokio::time::sleep(self.limits.run_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = set.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(Ok(chunk_run)) => {
                            for outcome in &chunk_run.outcomes {
                                run.stats.record(outcome);
                            }
                            run.connections.extend(chunk_run.connections);
                            run.completed_chunk_ids.push(chunk_run.chunk_id);
                            run.chunks_completed += 1;
                        }
                        Ok(Err(e)) => {
                            set.abort_all();
                            return Err(e);
                        }
                        Err(join_err) => {
                            // Engine panics are contained inside `run`; this is the chunk task itself.
                            warn!(error = %join_err, "chunk task failed");
                        }
                    }
                }
                _ = &mut deadline => {
                    set.abort_all();
                    run.deadline_exceeded = true;
                    warn!(
                        completed = run.chunks_completed,
                        total = chunks.len(),
                        "run deadline exceeded, keeping partial results"
                    );
                    break;
                }
            }
        }

        Ok(run)
    }
}

/// Reject pools the engines cannot work with.
fn validate_pool(chunk: &Chunk, candidates: &[Chunk]) -> Result<(), PipelineError> {
    if candidates.is_empty() {
        return Err(PipelineError::EmptyCandidatePool {
            chunk_id: chunk.id.clone(),
        });
    }
    for (position, candidate) in candidates.iter().enumerate() {
        let reason = if candidate.id.trim().is_empty() {
            "empty chunk id"
        } else if candidate.end_offset < candidate.start_offset {
            "end_offset before start_offset"
        } else {
            continue;
        };
        return Err(PipelineError::MalformedCandidate {
            chunk_id: chunk.id.clone(),
            position,
            reason: reason.to_string(),
        });
    }
    Ok(())
}

/// Weight, cap per engine, then cap per chunk.
///
/// `groups` holds `(weight, results)` per engine in engine order.
/// Non-finite strengths are dropped.
pub fn merge_results(
    groups: Vec<(f64, Vec<EngineResult>)>,
    per_engine: usize,
    per_chunk: usize,
) -> Vec<Connection> {
    let mut pool: Vec<Connection> = Vec::new();
    for (weight, results) in groups {
        let mut weighted: Vec<Connection> = results
            .into_iter()
            .filter(|r| r.raw_strength.is_finite())
            .map(|r| Connection {
                weighted_score: r.raw_strength * weight,
                source_chunk_id: r.source_chunk_id,
                target_chunk_id: r.target_chunk_id,
                relation_type: r.relation_type,
                raw_strength: r.raw_strength,
                engine_name: r.engine_name,
                metadata: r.explanation,
            })
            .collect();
        weighted.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
        weighted.truncate(per_engine);
        pool.extend(weighted);
    }
    pool.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
    pool.truncate(per_chunk);
    pool
}
