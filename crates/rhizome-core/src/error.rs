//! Fatal, structural pipeline errors.
//!
//! Recoverable failures (a single engine timing out, a persistence batch
//! failing) never surface as these; they are logged and counted. A
//! `PipelineError` aborts the current document's run and carries enough
//! context to produce a user-facing message.

/// Stage of the pipeline an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Mapping,
    Detection,
    Configuration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Mapping => "coordinate_mapping",
            Stage::Detection => "connection_detection",
            Stage::Configuration => "configuration",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("document {document_id}: no chunks to map {anchor_count} anchors onto")]
    EmptyChunkStream {
        document_id: String,
        anchor_count: usize,
    },

    #[error("chunk {chunk_id}: candidate pool is empty")]
    EmptyCandidatePool { chunk_id: String },

    #[error("chunk {chunk_id}: malformed candidate at position {position}: {reason}")]
    MalformedCandidate {
        chunk_id: String,
        position: usize,
        reason: String,
    },

    #[error(
        "anchor {anchor_id}: exact match at [{start}, {end}) does not reproduce the anchor text"
    )]
    ExactMatchMismatch {
        anchor_id: String,
        start: usize,
        end: usize,
    },

    #[error("anchor {anchor_id}: no position could be produced, even by interpolation")]
    UnrecoverableAnchor { anchor_id: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyChunkStream { .. }
            | PipelineError::ExactMatchMismatch { .. }
            | PipelineError::UnrecoverableAnchor { .. } => Stage::Mapping,
            PipelineError::EmptyCandidatePool { .. } | PipelineError::MalformedCandidate { .. } => {
                Stage::Detection
            }
            PipelineError::InvalidConfig { .. } => Stage::Configuration,
        }
    }
}
