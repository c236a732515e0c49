//! Retry-round values: the audit entry, round status and the narrowed
//! recollection request built from a failing gate report.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::collector::{RecollectionFocus, ResearchContext};
use crate::evidence::EvidenceItem;
use crate::gates::{GateId, QualityGateReport};
use crate::pillars::PillarKind;

/// Claims included as an evidence sample in a recollection prompt.
pub const EVIDENCE_SAMPLE_SIZE: usize = 8;

/// How a retry round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// The chosen collector reported failure; nothing was re-evaluated.
    CollectorFailed,
    /// No gate fails after the round.
    Resolved,
    /// Fewer gates fail than before.
    Improved,
    Unchanged,
}

impl RoundStatus {
    pub fn classify(collector_ok: bool, before: &[GateId], after: &[GateId]) -> Self {
        if !collector_ok {
            RoundStatus::CollectorFailed
        } else if after.is_empty() {
            RoundStatus::Resolved
        } else if after.len() < before.len() {
            RoundStatus::Improved
        } else {
            RoundStatus::Unchanged
        }
    }
}

/// One retry round, persisted in `retry_audit.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAuditEntry {
    pub round: usize,
    pub failing_before: Vec<GateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    pub evidence_added: usize,
    pub failing_after: Vec<GateId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resynthesized: Vec<PillarKind>,
    pub status: RoundStatus,
    pub duration_ms: u64,
}

/// What a round hands to the next one: its audit entry and the gate report
/// the next decision is made on.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub audit: RetryAuditEntry,
    pub report: QualityGateReport,
}

impl RoundResult {
    pub fn status(&self) -> RoundStatus {
        self.audit.status
    }
}

/// Up to [`EVIDENCE_SAMPLE_SIZE`] claims, highest confidence first.
pub fn evidence_sample(evidence: &[EvidenceItem]) -> Vec<String> {
    let mut ranked: Vec<&EvidenceItem> = evidence.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
        .into_iter()
        .take(EVIDENCE_SAMPLE_SIZE)
        .map(|e| e.claim.clone())
        .collect()
}

/// Build the narrowed request for round `round`.
pub fn build_focus(
    round: usize,
    context: &ResearchContext,
    report: &QualityGateReport,
    segments: &[String],
    evidence: &[EvidenceItem],
) -> RecollectionFocus {
    let evidence_sample = evidence_sample(evidence);
    let prompt = build_recollection_prompt(context, report, segments, &evidence_sample);
    RecollectionFocus {
        round,
        failing_gates: report.failed_gate_ids.clone(),
        allowed_segments: segments.to_vec(),
        evidence_sample,
        prompt,
    }
}

/// Prompt naming each failing gate with its required and actual values, the
/// segment labels new evidence must stay within, and a sample of what is
/// already known.
pub fn build_recollection_prompt(
    context: &ResearchContext,
    report: &QualityGateReport,
    segments: &[String],
    sample: &[String],
) -> String {
    let mut prompt = format!(
        "Targeted follow-up research for {}. Close these quality gaps:\n",
        context.product_name
    );
    for check in report.checks.iter().filter(|c| !c.passed) {
        let _ = writeln!(
            prompt,
            "- {}: required {}, actual {}",
            check.gate_id, check.required, check.actual
        );
    }

    if segments.is_empty() {
        prompt.push_str("\nNo audience segments are defined yet; identify them.\n");
    } else {
        prompt.push_str("\nStay within these audience segments:\n");
        for segment in segments {
            let _ = writeln!(prompt, "- {segment}");
        }
    }

    if !sample.is_empty() {
        prompt.push_str("\nAlready known (do not repeat):\n");
        for claim in sample {
            let _ = writeln!(prompt, "- {claim}");
        }
    }
    prompt.push_str("\nCite a source URL for every new finding.\n");
    prompt
}
