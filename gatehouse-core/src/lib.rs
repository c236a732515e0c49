//! # Gatehouse Core
//!
//! Evidence and quality-gate engine for multi-provider market research.
//! Normalizes collector output into a deduplicated evidence ledger, audits it
//! for cross-source contradictions, schedules pillar synthesis, backfills
//! pillars from evidence, and gates the result with a bounded retry loop.

pub mod adjudicate;
pub mod artifacts;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod contradiction;
pub mod error;
pub mod evidence;
pub mod gates;
pub mod hardening;
pub mod lexicon;
pub mod persistence;
pub mod pillars;
pub mod pipeline;
pub mod telemetry;
pub mod text;
pub mod trace;

// Re-export commonly used types at the crate root.
pub use adjudicate::{AdjudicationOutput, Adjudicator};
pub use artifacts::ArtifactWriter;
pub use checkpoint::{CheckpointBundle, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use collector::{
    CollectionRequest, Collector, CollectorOutput, CollectorReport, CollectorSpecialty,
    RecollectionFocus, ResearchContext,
};
pub use config::{GatePolicy, PipelineConfig, load_config};
pub use contradiction::{ContradictionDetector, ContradictionRefiner, ContradictionReport, Severity};
pub use error::{GatehouseError, Result};
pub use evidence::{
    ConflictFlag, EvidenceItem, EvidenceNormalizer, EvidenceRow, EvidenceSummary, SourceType,
};
pub use gates::{GateId, GateThresholds, QualityGateCheck, QualityGateEngine, QualityGateReport};
pub use hardening::{CompetitorPattern, Hardener, HardeningLog, HardeningPolicy};
pub use lexicon::Lexicon;
pub use pillars::{PillarKind, PillarObject, PillarSynthesizer, ResearchPillars, SynthesisRequest};
pub use pipeline::{Pipeline, PipelineOutcome, RetryAuditEntry, RoundStatus};
pub use trace::StageTrace;
