//! Unified error taxonomy for the engine (spec.md §7).

use thiserror::Error;

/// Every failure mode the engine can report.
///
/// `RuleViolation` is deliberately absent here — violations are a report,
/// not an error (see [`crate::rules::Violation`]); parse mistakes in
/// individual diff lines are likewise not fatal (see
/// [`crate::diff::ParseWarning`]) and only show up here as
/// [`EngineError::DiffEnvelopeInvalid`] when the wrapping envelope itself is
/// broken.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("ontology configuration invalid: {reason}")]
    ConfigInvalid { reason: String },

    #[error("malformed semantic id `{id}`: {reason}")]
    MalformedSemanticId { id: String, reason: String },

    #[error("could not synthesize a unique id for `{name}` after {attempts} attempts")]
    IdExhaustion { name: String, attempts: u32 },

    #[error("duplicate node id `{id}`")]
    DuplicateId { id: String },

    #[error("duplicate edge `{source_id}-{kind}-{target}`")]
    DuplicateEdge {
        source_id: String,
        kind: String,
        target: String,
    },

    #[error("edge `{source_id}-{kind}-{target}` references a missing endpoint")]
    DanglingEdge {
        source_id: String,
        kind: String,
        target: String,
    },

    #[error("edge kind `{kind}` cannot connect `{source_kind}` to `{target_kind}`")]
    InvalidConnection {
        kind: String,
        source_kind: String,
        target_kind: String,
    },

    #[error("adding compose edge `{source_id}` -> `{target}` would create a cycle")]
    CircularCompose { source_id: String, target: String },

    #[error("diff envelope malformed: {reason}")]
    DiffEnvelopeInvalid { reason: String },

    #[error("layout `{algorithm}` exceeded its time budget of {budget_ms}ms")]
    LayoutTimeout { algorithm: String, budget_ms: u64 },

    #[error("optimizer search cancelled after {iterations} iterations")]
    OptimizerCancelled { iterations: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
