//! Run-level statistics for monitoring and the CLI.
//!
//! A [`RunReport`] is produced for every document processed by
//! [`crate::pipeline::Pipeline::process_document`]. It aggregates the mapper's
//! per-layer counts, the transfer's overlap coverage, per-engine latency
//! and failure counts, and what persistence managed to write.

use serde::Serialize;
use std::time::Duration;

use rhizome_core::mapper::MappingReport;
use rhizome_core::transfer::TransferReport;

use crate::persist::PersistReport;

/// How one engine invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Ok,
    /// Preconditions unmet; the engine was not called.
    Skipped,
    Failed,
    TimedOut,
    Panicked,
}

/// One engine's invocation against one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct EngineOutcome {
    pub engine: String,
    pub status: EngineStatus,
    #[serde(skip)]
    pub latency: Duration,
    pub results: usize,
}

/// Aggregate counters for one engine across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub engine: String,
    pub invocations: u64,
    pub skipped: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub panics: u64,
    pub results: u64,
    pub total_latency_ms: f64,
    /// Invocations with a measured latency. Panicked tasks have none.
    pub timed_invocations: u64,
}

impl EngineStats {
    pub fn new(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &EngineOutcome) {
        if outcome.status == EngineStatus::Skipped {
            self.skipped += 1;
            return;
        }
        self.invocations += 1;
        if outcome.status != EngineStatus::Panicked {
            self.total_latency_ms += outcome.latency.as_secs_f64() * 1000.0;
            self.timed_invocations += 1;
        }
        self.results += outcome.results as u64;
        match outcome.status {
            EngineStatus::Failed => self.failures += 1,
            EngineStatus::TimedOut => self.timeouts += 1,
            EngineStatus::Panicked => self.panics += 1,
            EngineStatus::Ok | EngineStatus::Skipped => {}
        }
    }

    /// Errors, timeouts and panics together.
    pub fn failure_count(&self) -> u64 {
        self.failures + self.timeouts + self.panics
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.timed_invocations == 0 {
            0.0
        } else {
            self.total_latency_ms / self.timed_invocations as f64
        }
    }
}

/// Per-engine stats in engine order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatsTable {
    pub engines: Vec<EngineStats>,
}

impl EngineStatsTable {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            engines: names.iter().map(|n| EngineStats::new(n.as_ref())).collect(),
        }
    }

    pub fn record(&mut self, outcome: &EngineOutcome) {
        match self.engines.iter_mut().find(|s| s.engine == outcome.engine) {
            Some(stats) => stats.record(outcome),
            None => {
                let mut stats = EngineStats::new(&outcome.engine);
                stats.record(outcome);
                self.engines.push(stats);
            }
        }
    }

    pub fn get(&self, engine: &str) -> Option<&EngineStats> {
        self.engines.iter().find(|s| s.engine == engine)
    }
}

/// Everything observable about one document run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub document_id: String,
    pub chunks: usize,
    pub mapping: MappingReport,
    pub transfer: TransferReport,
    pub embedded_chunks: usize,
    pub engines: EngineStatsTable,
    pub connections: usize,
    pub persistence: PersistReport,
    pub deadline_exceeded: bool,
    pub chunks_completed: usize,
}

impl RunReport {
    /// Human-readable summary, printed by `rhz connect`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Document: {}\n", self.document_id));
        out.push_str(&format!(
            "  Anchors:      {} (exact {}, fuzzy {}, embedding {}, assisted {}, interpolated {})\n",
            self.mapping.anchors,
            self.mapping.exact,
            self.mapping.fuzzy,
            self.mapping.embedding,
            self.mapping.assisted,
            self.mapping.interpolated
        ));
        out.push_str(&format!(
            "  Chunks:       {} ({} covered, {} interpolated, coverage {:.1}%)\n",
            self.chunks,
            self.transfer.covered,
            self.transfer.interpolated,
            self.transfer.coverage_percent()
        ));
        if self.embedded_chunks > 0 {
            out.push_str(&format!("  Embedded:     {}\n", self.embedded_chunks));
        }
        out.push_str(&format!(
            "  Connections:  {} ({} written, {} failed)\n",
            self.connections, self.persistence.rows_written, self.persistence.rows_failed
        ));
        if self.deadline_exceeded {
            out.push_str(&format!(
                "  Deadline exceeded after {} of {} chunks\n",
                self.chunks_completed, self.chunks
            ));
        }
        out.push_str("\n  Engine                     Calls  Skipped  Failed  Avg ms  Results\n");
        for e in &self.engines.engines {
            out.push_str(&format!(
                "  {:<26} {:>5}  {:>7}  {:>6}  {:>6.1}  {:>7}\n",
                e.engine,
                e.invocations,
                e.skipped,
                e.failure_count(),
                e.avg_latency_ms(),
                e.results
            ));
        }
        out
    }
}
