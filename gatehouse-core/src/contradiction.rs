//! Cross-provider contradiction detection and flag propagation.
//!
//! Evidence is grouped by a coarse topic key (its first two pillar tags).
//! Within a topic, pairs from different providers that share vocabulary but
//! carry opposite sentiment polarity are reported. An optional refiner may
//! prune or re-grade those candidates but never add new pairs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ContradictionError;
use crate::evidence::{ConflictFlag, EvidenceItem};
use crate::lexicon::Lexicon;
use crate::pillars::PillarKind;
use crate::text;

/// Severity of a contradiction, graded by the weaker side's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn for_confidence(min_confidence: f64) -> Self {
        if min_confidence >= 0.75 {
            Severity::High
        } else if min_confidence >= 0.55 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// A flagged conflict between two evidence items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionReport {
    pub evidence_a: String,
    pub evidence_b: String,
    pub provider_a: String,
    pub provider_b: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub resolved: bool,
}

impl ContradictionReport {
    /// Flag to propagate onto both items.
    pub fn flag(&self) -> ConflictFlag {
        match (self.severity, self.resolved) {
            (Severity::High, false) => ConflictFlag::HighUnresolved,
            (Severity::High, true) | (Severity::Medium, _) => ConflictFlag::Medium,
            (Severity::Low, _) => ConflictFlag::Low,
        }
    }

    /// Order-insensitive identity of the pair.
    pub fn pair_key(&self) -> (String, String) {
        pair_key(&self.evidence_a, &self.evidence_b)
    }

    pub fn is_high_unresolved(&self) -> bool {
        self.severity == Severity::High && !self.resolved
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Detects polarity conflicts between providers.
#[derive(Debug, Clone)]
pub struct ContradictionDetector {
    lexicon: Lexicon,
    /// Minimum shared tokens for two claims to be about the same thing.
    min_overlap: usize,
}

impl ContradictionDetector {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            min_overlap: 2,
        }
    }

    /// Detect contradictions across the ledger.
    pub fn detect(&self, evidence: &[EvidenceItem]) -> Vec<ContradictionReport> {
        let mut topics: BTreeMap<Vec<PillarKind>, Vec<&EvidenceItem>> = BTreeMap::new();
        for item in evidence {
            let key: Vec<PillarKind> = item.pillar_tags.iter().take(2).copied().collect();
            topics.entry(key).or_default().push(item);
        }

        let mut reports = Vec::new();
        for (topic, items) in &topics {
            for i in 0..items.len() {
                for j in (i + 1)..items.len() {
                    if items[i].provider == items[j].provider {
                        continue;
                    }
                    if let Some(report) = self.check_pair(items[i], items[j]) {
                        reports.push(report);
                    }
                }
            }
            debug!(topic = ?topic, items = items.len(), "Scanned topic for contradictions");
        }

        info!(count = reports.len(), "Contradiction detection complete");
        reports
    }

    fn check_pair(&self, a: &EvidenceItem, b: &EvidenceItem) -> Option<ContradictionReport> {
        let tokens_a = text::tokens(&a.claim, &self.lexicon);
        let tokens_b = text::tokens(&b.claim, &self.lexicon);
        let overlap = text::overlap(&tokens_a, &tokens_b);
        if overlap < self.min_overlap {
            return None;
        }

        let min_conf = a.confidence.min(b.confidence);
        if min_conf < 0.40 && (a.confidence - b.confidence).abs() > 0.35 {
            return None;
        }

        let polarity_a = text::polarity(&a.claim, &self.lexicon);
        let polarity_b = text::polarity(&b.claim, &self.lexicon);
        if polarity_a.signum() * polarity_b.signum() >= 0 {
            return None;
        }

        let shared: Vec<&str> = tokens_a
            .intersection(&tokens_b)
            .map(String::as_str)
            .take(5)
            .collect();
        Some(ContradictionReport {
            evidence_a: a.evidence_id.clone(),
            evidence_b: b.evidence_id.clone(),
            provider_a: a.provider.clone(),
            provider_b: b.provider.clone(),
            description: format!(
                "{} and {} disagree about {}",
                a.provider,
                b.provider,
                shared.join(", ")
            ),
            severity: Severity::for_confidence(min_conf),
            resolution: String::new(),
            resolved: false,
        })
    }
}

/// Raise each referenced item's flag to the report's flag. Never lowers.
///
/// Returns the number of items whose flag changed.
pub fn propagate_flags(evidence: &mut [EvidenceItem], reports: &[ContradictionReport]) -> usize {
    let mut target: HashMap<&str, ConflictFlag> = HashMap::new();
    for report in reports {
        let flag = report.flag();
        for id in [report.evidence_a.as_str(), report.evidence_b.as_str()] {
            let entry = target.entry(id).or_default();
            *entry = (*entry).max(flag);
        }
    }

    let mut raised = 0;
    for item in evidence.iter_mut() {
        if let Some(&flag) = target.get(item.evidence_id.as_str()) {
            if flag > item.conflict_flag {
                item.conflict_flag = flag;
                raised += 1;
            }
        }
    }
    raised
}

/// Count of reports that are high severity and unresolved.
pub fn high_unresolved_count(reports: &[ContradictionReport]) -> usize {
    reports.iter().filter(|r| r.is_high_unresolved()).count()
}

/// A refiner's judgment about one heuristic candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedVerdict {
    pub evidence_a: String,
    pub evidence_b: String,
    /// `false` prunes the candidate as a false positive.
    pub keep: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved: bool,
}

/// External pass that prunes false positives and re-grades candidates.
#[async_trait]
pub trait ContradictionRefiner: Send + Sync {
    async fn refine(
        &self,
        evidence: &[EvidenceItem],
        candidates: &[ContradictionReport],
    ) -> Result<Vec<RefinedVerdict>, ContradictionError>;
}

/// Apply verdicts to the candidate set.
///
/// Verdicts for pairs not among the candidates are ignored, and candidates
/// without a verdict are kept unchanged.
pub fn apply_verdicts(
    candidates: Vec<ContradictionReport>,
    verdicts: &[RefinedVerdict],
) -> Vec<ContradictionReport> {
    let by_pair: HashMap<(String, String), &RefinedVerdict> = verdicts
        .iter()
        .map(|v| (pair_key(&v.evidence_a, &v.evidence_b), v))
        .collect();

    candidates
        .into_iter()
        .filter_map(|mut report| match by_pair.get(&report.pair_key()) {
            None => Some(report),
            Some(verdict) if !verdict.keep => None,
            Some(verdict) => {
                if let Some(severity) = verdict.severity {
                    report.severity = severity;
                }
                if let Some(resolution) = &verdict.resolution {
                    report.resolution = resolution.clone();
                }
                report.resolved = verdict.resolved;
                Some(report)
            }
        })
        .collect()
}

/// Run the refiner, falling back to the heuristic set on failure.
pub async fn refine(
    refiner: &dyn ContradictionRefiner,
    evidence: &[EvidenceItem],
    candidates: Vec<ContradictionReport>,
) -> Vec<ContradictionReport> {
    if candidates.is_empty() {
        return candidates;
    }
    match refiner.refine(evidence, &candidates).await {
        Ok(verdicts) => {
            let before = candidates.len();
            let refined = apply_verdicts(candidates, &verdicts);
            info!(before, after = refined.len(), "Refined contradiction candidates");
            refined
        }
        Err(e) => {
            warn!(error = %e, "Contradiction refinement failed; keeping heuristic set");
            candidates
        }
    }
}
