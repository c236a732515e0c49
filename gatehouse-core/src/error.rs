//! Error types for the Gatehouse engine.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering collection, contradiction blocking, quality gates, synthesis,
//! adjudication, checkpoints and configuration.
//!
//! Malformed evidence rows are never errors: normalization drops them.

use crate::gates::GateId;
use crate::pillars::PillarKind;

/// Top-level error type for the Gatehouse core library.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Contradiction error: {0}")]
    Contradiction(#[from] ContradictionError),

    #[error("Quality gate error: {0}")]
    QualityGate(#[from] QualityGateError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Adjudication error: {0}")]
    Adjudication(#[from] AdjudicationError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the collection stage.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("All {attempted} collectors failed; no evidence was gathered")]
    AllFailed { attempted: usize },

    #[error("No collectors are enabled")]
    NoneEnabled,
}

/// Errors raised by strict contradiction mode.
#[derive(Debug, thiserror::Error)]
pub enum ContradictionError {
    #[error("{count} unresolved high-severity contradictions block synthesis")]
    Blocked { count: usize },

    #[error("Contradiction refinement failed: {message}")]
    Refinement { message: String },
}

/// Errors raised when quality gates stay red under the strict policy.
#[derive(Debug, thiserror::Error)]
pub enum QualityGateError {
    #[error("Quality gates still failing after {rounds} retry rounds: {}", join_ids(.failed_gate_ids))]
    Blocked {
        failed_gate_ids: Vec<GateId>,
        rounds: usize,
    },
}

/// Errors from pillar synthesizer calls.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Synthesizer failed for {pillar}: {message}")]
    Failed { pillar: PillarKind, message: String },

    #[error("Synthesizer returned {got} when {expected} was requested")]
    WrongKind {
        expected: PillarKind,
        got: PillarKind,
    },
}

/// Errors from the adjudicator call.
#[derive(Debug, thiserror::Error)]
pub enum AdjudicationError {
    #[error("Adjudication failed: {message}")]
    Failed { message: String },
}

/// Errors from the collector checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("Checkpoint store unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

fn join_ids(ids: &[GateId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A type alias for results using the top-level `GatehouseError`.
pub type Result<T> = std::result::Result<T, GatehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_collector() {
        let err = GatehouseError::Collector(CollectorError::AllFailed { attempted: 3 });
        assert_eq!(
            err.to_string(),
            "Collector error: All 3 collectors failed; no evidence was gathered"
        );
    }

    #[test]
    fn test_error_display_quality_gate() {
        let err = GatehouseError::QualityGate(QualityGateError::Blocked {
            failed_gate_ids: vec![GateId::Pillar2VocDepth, GateId::Pillar7ProofCoverage],
            rounds: 2,
        });
        assert_eq!(
            err.to_string(),
            "Quality gate error: Quality gates still failing after 2 retry rounds: \
             pillar_2_voc_depth, pillar_7_proof_coverage"
        );
    }

    #[test]
    fn test_error_display_synthesis() {
        let err = SynthesisError::WrongKind {
            expected: PillarKind::VocBank,
            got: PillarKind::ProofInventory,
        };
        assert_eq!(
            err.to_string(),
            "Synthesizer returned pillar_7 when pillar_2 was requested"
        );
    }

    #[test]
    fn test_error_display_contradiction() {
        let err = GatehouseError::Contradiction(ContradictionError::Blocked { count: 4 });
        assert_eq!(
            err.to_string(),
            "Contradiction error: 4 unresolved high-severity contradictions block synthesis"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GatehouseError = io_err.into();
        assert!(matches!(err, GatehouseError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: GatehouseError = serde_err.into();
        assert!(matches!(err, GatehouseError::Serialization(_)));
    }
}
