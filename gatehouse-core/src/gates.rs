//! Quality gate engine.
//!
//! A fixed, ordered set of independent gates over the evidence ledger,
//! contradiction reports and pillars. The report's `overall_pass` is the
//! conjunction of all checks; `failed_gate_ids` drives targeted retries.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::contradiction::ContradictionReport;
use crate::evidence::{ConflictFlag, EvidenceItem};
use crate::lexicon::Lexicon;
use crate::pillars::{
    PillarKind, ProofType, QuoteCategory, ResearchPillars, build_cross_pillar_report,
};

/// Stable gate identifiers, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GateId {
    #[serde(rename = "global_evidence_coverage")]
    GlobalEvidenceCoverage,
    #[serde(rename = "contradiction_audit")]
    ContradictionAudit,
    #[serde(rename = "pillar_1_profile_completeness")]
    Pillar1ProfileCompleteness,
    #[serde(rename = "pillar_2_voc_depth")]
    Pillar2VocDepth,
    #[serde(rename = "pillar_2_segment_alignment")]
    Pillar2SegmentAlignment,
    #[serde(rename = "pillar_3_competitive_depth")]
    Pillar3CompetitiveDepth,
    #[serde(rename = "pillar_4_mechanism_strength")]
    Pillar4MechanismStrength,
    #[serde(rename = "pillar_5_awareness_validity")]
    Pillar5AwarenessValidity,
    #[serde(rename = "pillar_6_emotion_dominance")]
    Pillar6EmotionDominance,
    #[serde(rename = "pillar_7_proof_coverage")]
    Pillar7ProofCoverage,
    #[serde(rename = "cross_pillar_consistency")]
    CrossPillarConsistency,
}

impl GateId {
    pub const ALL: [GateId; 11] = [
        GateId::GlobalEvidenceCoverage,
        GateId::ContradictionAudit,
        GateId::Pillar1ProfileCompleteness,
        GateId::Pillar2VocDepth,
        GateId::Pillar2SegmentAlignment,
        GateId::Pillar3CompetitiveDepth,
        GateId::Pillar4MechanismStrength,
        GateId::Pillar5AwarenessValidity,
        GateId::Pillar6EmotionDominance,
        GateId::Pillar7ProofCoverage,
        GateId::CrossPillarConsistency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GateId::GlobalEvidenceCoverage => "global_evidence_coverage",
            GateId::ContradictionAudit => "contradiction_audit",
            GateId::Pillar1ProfileCompleteness => "pillar_1_profile_completeness",
            GateId::Pillar2VocDepth => "pillar_2_voc_depth",
            GateId::Pillar2SegmentAlignment => "pillar_2_segment_alignment",
            GateId::Pillar3CompetitiveDepth => "pillar_3_competitive_depth",
            GateId::Pillar4MechanismStrength => "pillar_4_mechanism_strength",
            GateId::Pillar5AwarenessValidity => "pillar_5_awareness_validity",
            GateId::Pillar6EmotionDominance => "pillar_6_emotion_dominance",
            GateId::Pillar7ProofCoverage => "pillar_7_proof_coverage",
            GateId::CrossPillarConsistency => "cross_pillar_consistency",
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == id.trim())
    }

    /// Pillars to re-synthesize when this gate fails.
    pub fn pillars(self) -> &'static [PillarKind] {
        use PillarKind::*;
        match self {
            GateId::GlobalEvidenceCoverage => &[ProspectProfile, VocBank],
            GateId::ContradictionAudit => &[],
            GateId::Pillar1ProfileCompleteness => &[ProspectProfile],
            GateId::Pillar2VocDepth => &[VocBank, EmotionalDrivers],
            GateId::Pillar2SegmentAlignment => &[VocBank],
            GateId::Pillar3CompetitiveDepth => &[CompetitiveIntel],
            GateId::Pillar4MechanismStrength => &[Mechanism],
            GateId::Pillar5AwarenessValidity => &[Awareness],
            GateId::Pillar6EmotionDominance => &[EmotionalDrivers],
            GateId::Pillar7ProofCoverage => &[ProofInventory],
            GateId::CrossPillarConsistency => &[ProspectProfile, VocBank, Mechanism, EmotionalDrivers],
        }
    }

    /// Whether a VOC-focused collector is the best fix.
    pub fn is_voc_related(self) -> bool {
        matches!(
            self,
            GateId::Pillar2VocDepth | GateId::Pillar2SegmentAlignment | GateId::Pillar6EmotionDominance
        )
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Union of the re-synthesis targets of `gates`.
pub fn pillars_for_gates(gates: &[GateId]) -> BTreeSet<PillarKind> {
    gates.iter().flat_map(|g| g.pillars().iter().copied()).collect()
}

fn default_min_source_types() -> usize {
    4
}
fn default_min_evidence_items() -> usize {
    40
}
fn default_min_segments() -> usize {
    2
}
fn default_voc_min_total() -> usize {
    30
}
fn default_voc_min_pain() -> usize {
    6
}
fn default_voc_min_desire() -> usize {
    6
}
fn default_voc_min_objection() -> usize {
    4
}
fn default_voc_min_trigger() -> usize {
    3
}
fn default_voc_min_proof() -> usize {
    3
}
fn default_voc_max_new_themes_last_30() -> usize {
    8
}
fn default_competitor_floor() -> usize {
    3
}
fn default_competitor_target() -> usize {
    5
}
fn default_mechanism_min_support() -> usize {
    10
}
fn default_awareness_min_support() -> usize {
    5
}
fn default_awareness_tolerance() -> f64 {
    0.05
}
fn default_emotion_min_distinct() -> usize {
    3
}
fn default_emotion_min_high_confidence() -> usize {
    2
}
fn default_emotion_high_confidence() -> f64 {
    0.7
}
fn default_proof_min_per_type() -> usize {
    2
}
fn default_lf8_min_quotes() -> usize {
    2
}
fn default_lf8_min_domains() -> usize {
    2
}

/// Numeric gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    #[serde(default = "default_min_source_types")]
    pub min_source_types: usize,
    #[serde(default = "default_min_evidence_items")]
    pub min_evidence_items: usize,
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
    #[serde(default = "default_voc_min_total")]
    pub voc_min_total: usize,
    #[serde(default = "default_voc_min_pain")]
    pub voc_min_pain: usize,
    #[serde(default = "default_voc_min_desire")]
    pub voc_min_desire: usize,
    #[serde(default = "default_voc_min_objection")]
    pub voc_min_objection: usize,
    #[serde(default = "default_voc_min_trigger")]
    pub voc_min_trigger: usize,
    #[serde(default = "default_voc_min_proof")]
    pub voc_min_proof: usize,
    #[serde(default = "default_voc_max_new_themes_last_30")]
    pub voc_max_new_themes_last_30: usize,
    #[serde(default = "default_competitor_floor")]
    pub competitor_floor: usize,
    #[serde(default = "default_competitor_target")]
    pub competitor_target: usize,
    #[serde(default = "default_mechanism_min_support")]
    pub mechanism_min_support: usize,
    #[serde(default = "default_awareness_min_support")]
    pub awareness_min_support: usize,
    #[serde(default = "default_awareness_tolerance")]
    pub awareness_tolerance: f64,
    #[serde(default = "default_emotion_min_distinct")]
    pub emotion_min_distinct: usize,
    #[serde(default = "default_emotion_min_high_confidence")]
    pub emotion_min_high_confidence: usize,
    #[serde(default = "default_emotion_high_confidence")]
    pub emotion_high_confidence: f64,
    #[serde(default = "default_proof_min_per_type")]
    pub proof_min_per_type: usize,
    #[serde(default = "default_lf8_min_quotes")]
    pub lf8_min_quotes: usize,
    #[serde(default = "default_lf8_min_domains")]
    pub lf8_min_domains: usize,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_source_types: default_min_source_types(),
            min_evidence_items: default_min_evidence_items(),
            min_segments: default_min_segments(),
            voc_min_total: default_voc_min_total(),
            voc_min_pain: default_voc_min_pain(),
            voc_min_desire: default_voc_min_desire(),
            voc_min_objection: default_voc_min_objection(),
            voc_min_trigger: default_voc_min_trigger(),
            voc_min_proof: default_voc_min_proof(),
            voc_max_new_themes_last_30: default_voc_max_new_themes_last_30(),
            competitor_floor: default_competitor_floor(),
            competitor_target: default_competitor_target(),
            mechanism_min_support: default_mechanism_min_support(),
            awareness_min_support: default_awareness_min_support(),
            awareness_tolerance: default_awareness_tolerance(),
            emotion_min_distinct: default_emotion_min_distinct(),
            emotion_min_high_confidence: default_emotion_min_high_confidence(),
            emotion_high_confidence: default_emotion_high_confidence(),
            proof_min_per_type: default_proof_min_per_type(),
            lf8_min_quotes: default_lf8_min_quotes(),
            lf8_min_domains: default_lf8_min_domains(),
        }
    }
}

impl GateThresholds {
    /// Minimum valid quotes for a category.
    pub fn voc_min(&self, category: QuoteCategory) -> usize {
        match category {
            QuoteCategory::Pain => self.voc_min_pain,
            QuoteCategory::Desire => self.voc_min_desire,
            QuoteCategory::Objection => self.voc_min_objection,
            QuoteCategory::Trigger => self.voc_min_trigger,
            QuoteCategory::Proof => self.voc_min_proof,
        }
    }
}

/// Outcome of one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateCheck {
    pub gate_id: GateId,
    pub passed: bool,
    pub required: String,
    pub actual: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl QualityGateCheck {
    fn new(gate_id: GateId, passed: bool, required: String, actual: String) -> Self {
        Self {
            gate_id,
            passed,
            required,
            actual,
            details: Vec::new(),
        }
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    fn missing(gate_id: GateId, required: String) -> Self {
        Self::new(gate_id, false, required, "pillar missing".to_string())
    }
}

/// All checks for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateReport {
    pub checks: Vec<QualityGateCheck>,
    pub failed_gate_ids: Vec<GateId>,
    pub overall_pass: bool,
    #[serde(default)]
    pub retry_rounds_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl QualityGateReport {
    pub fn from_checks(checks: Vec<QualityGateCheck>) -> Self {
        let failed_gate_ids: Vec<GateId> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.gate_id)
            .collect();
        Self {
            overall_pass: failed_gate_ids.is_empty(),
            checks,
            failed_gate_ids,
            retry_rounds_used: 0,
            warning: None,
        }
    }

    /// Placeholder written before a fatal error: every gate unknown and failing.
    pub fn stub(reason: &str) -> Self {
        let checks = GateId::ALL
            .into_iter()
            .map(|id| QualityGateCheck::new(id, false, String::new(), "not evaluated".to_string()))
            .collect();
        let mut report = Self::from_checks(checks);
        report.warning = Some(reason.to_string());
        report
    }

    pub fn check(&self, gate_id: GateId) -> Option<&QualityGateCheck> {
        self.checks.iter().find(|c| c.gate_id == gate_id)
    }
}

/// Evaluates the fixed gate set.
#[derive(Debug, Clone)]
pub struct QualityGateEngine {
    thresholds: GateThresholds,
    lexicon: Lexicon,
}

impl QualityGateEngine {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            thresholds,
            lexicon: Lexicon::v1(),
        }
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn thresholds(&self) -> &GateThresholds {
        &self.thresholds
    }

    pub fn evaluate(
        &self,
        evidence: &[EvidenceItem],
        contradictions: &[ContradictionReport],
        pillars: &ResearchPillars,
    ) -> QualityGateReport {
        let known_ids: HashSet<&str> = evidence.iter().map(|e| e.evidence_id.as_str()).collect();
        let checks = vec![
            self.evidence_coverage(evidence),
            self.contradiction_audit(evidence, contradictions),
            self.profile_completeness(pillars),
            self.voc_depth(pillars),
            self.segment_alignment(pillars),
            self.competitive_depth(pillars),
            self.mechanism_strength(pillars, &known_ids),
            self.awareness_validity(pillars, &known_ids),
            self.emotion_dominance(pillars),
            self.proof_coverage(pillars),
            self.cross_pillar(pillars),
        ];
        let report = QualityGateReport::from_checks(checks);
        info!(
            overall_pass = report.overall_pass,
            failed = ?report.failed_gate_ids,
            "Quality gates evaluated"
        );
        report
    }

    fn evidence_coverage(&self, evidence: &[EvidenceItem]) -> QualityGateCheck {
        let t = &self.thresholds;
        let types: BTreeSet<_> = evidence.iter().map(|e| e.source_type).collect();
        QualityGateCheck::new(
            GateId::GlobalEvidenceCoverage,
            types.len() >= t.min_source_types && evidence.len() >= t.min_evidence_items,
            format!(
                ">= {} source types and >= {} evidence items",
                t.min_source_types, t.min_evidence_items
            ),
            format!("{} source types, {} evidence items", types.len(), evidence.len()),
        )
    }

    fn contradiction_audit(
        &self,
        evidence: &[EvidenceItem],
        contradictions: &[ContradictionReport],
    ) -> QualityGateCheck {
        let flagged: Vec<String> = evidence
            .iter()
            .filter(|e| e.conflict_flag == ConflictFlag::HighUnresolved)
            .map(|e| e.evidence_id.clone())
            .collect();
        let details = contradictions
            .iter()
            .filter(|r| r.is_high_unresolved())
            .map(|r| format!("{} vs {}: {}", r.evidence_a, r.evidence_b, r.description))
            .collect();
        QualityGateCheck::new(
            GateId::ContradictionAudit,
            flagged.is_empty(),
            "0 evidence items flagged high_unresolved".to_string(),
            format!("{} flagged", flagged.len()),
        )
        .with_details(details)
    }

    fn profile_completeness(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let required = format!(
            ">= {} segments, each with name, description, pains, desires and objections",
            self.thresholds.min_segments
        );
        let Some(profile) = &pillars.prospect_profile else {
            return QualityGateCheck::missing(GateId::Pillar1ProfileCompleteness, required);
        };
        let details: Vec<String> = profile
            .segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let missing = s.missing_fields();
                (!missing.is_empty()).then(|| {
                    let name = if s.name.trim().is_empty() { format!("#{}", i + 1) } else { s.name.clone() };
                    format!("{name} missing {}", missing.join(", "))
                })
            })
            .collect();
        let count = profile.segments.len();
        QualityGateCheck::new(
            GateId::Pillar1ProfileCompleteness,
            count >= self.thresholds.min_segments && details.is_empty(),
            required,
            format!("{count} segments, {} incomplete", details.len()),
        )
        .with_details(details)
    }

    fn voc_depth(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let t = &self.thresholds;
        let required = format!(
            ">= {} valid quotes (pain {}, desire {}, objection {}, trigger {}, proof {}), \
             <= {} new themes in last 30, 0 invalid, all segments known",
            t.voc_min_total,
            t.voc_min_pain,
            t.voc_min_desire,
            t.voc_min_objection,
            t.voc_min_trigger,
            t.voc_min_proof,
            t.voc_max_new_themes_last_30
        );
        let Some(bank) = &pillars.voc_bank else {
            return QualityGateCheck::missing(GateId::Pillar2VocDepth, required);
        };

        let counts = bank.valid_counts();
        let total: usize = counts.values().sum();
        let invalid = bank.quotes.len() - total;
        let new_themes = new_themes_in_last_30(bank.valid_quotes().map(|q| q.theme.as_deref()));
        let misaligned = misaligned_quotes(pillars).len();

        let mut details = Vec::new();
        for category in QuoteCategory::ALL {
            let have = counts.get(&category).copied().unwrap_or(0);
            let need = t.voc_min(category);
            if have < need {
                details.push(format!("{}: {have} < {need}", category.as_str()));
            }
        }
        if invalid > 0 {
            details.push(format!("{invalid} invalid quotes excluded"));
        }
        if new_themes > t.voc_max_new_themes_last_30 {
            details.push(format!("{new_themes} new themes in last 30 quotes"));
        }
        if misaligned > 0 {
            details.push(format!("{misaligned} quotes reference unknown segments"));
        }

        let per_category_ok = QuoteCategory::ALL
            .into_iter()
            .all(|c| counts.get(&c).copied().unwrap_or(0) >= t.voc_min(c));
        QualityGateCheck::new(
            GateId::Pillar2VocDepth,
            total >= t.voc_min_total
                && per_category_ok
                && invalid == 0
                && new_themes <= t.voc_max_new_themes_last_30
                && misaligned == 0,
            required,
            format!(
                "{total} valid quotes ({}), {invalid} invalid, {new_themes} new themes",
                counts
                    .iter()
                    .map(|(c, n)| format!("{} {n}", c.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
        .with_details(details)
    }

    fn segment_alignment(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let required = "every quote's segment exists in pillar 1".to_string();
        if pillars.voc_bank.is_none() {
            return QualityGateCheck::missing(GateId::Pillar2SegmentAlignment, required);
        }
        let misaligned = misaligned_quotes(pillars);
        let details: Vec<String> = misaligned
            .iter()
            .map(|(id, segment)| format!("{id} -> '{segment}'"))
            .collect();
        QualityGateCheck::new(
            GateId::Pillar2SegmentAlignment,
            misaligned.is_empty(),
            required,
            format!("{} misaligned quotes", misaligned.len()),
        )
        .with_details(details)
    }

    fn competitive_depth(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let t = &self.thresholds;
        let required = format!(
            ">= {} competitors (target {}), all fields populated",
            t.competitor_floor, t.competitor_target
        );
        let Some(intel) = &pillars.competitive_intel else {
            return QualityGateCheck::missing(GateId::Pillar3CompetitiveDepth, required);
        };
        let count = intel.competitors.len();
        let mut details: Vec<String> = intel
            .competitors
            .iter()
            .filter_map(|c| {
                let missing = c.missing_fields();
                (!missing.is_empty()).then(|| format!("{} missing {}", c.name, missing.join(", ")))
            })
            .collect();
        let incomplete = details.len();
        if count < t.competitor_target {
            details.push(format!("below target of {}", t.competitor_target));
        }
        QualityGateCheck::new(
            GateId::Pillar3CompetitiveDepth,
            count >= t.competitor_floor && incomplete == 0,
            required,
            format!("{count} competitors, {incomplete} incomplete"),
        )
        .with_details(details)
    }

    fn mechanism_strength(&self, pillars: &ResearchPillars, known: &HashSet<&str>) -> QualityGateCheck {
        let min = self.thresholds.mechanism_min_support;
        let required = format!("problem and solution mechanism, >= {min} supporting evidence ids");
        let Some(mechanism) = &pillars.mechanism else {
            return QualityGateCheck::missing(GateId::Pillar4MechanismStrength, required);
        };
        let support = count_known(&mechanism.supporting_evidence_ids, known);
        QualityGateCheck::new(
            GateId::Pillar4MechanismStrength,
            mechanism.is_two_part() && support >= min,
            required,
            format!(
                "{}, {support} supporting ids",
                if mechanism.is_two_part() { "two-part" } else { "incomplete" }
            ),
        )
    }

    fn awareness_validity(&self, pillars: &ResearchPillars, known: &HashSet<&str>) -> QualityGateCheck {
        let t = &self.thresholds;
        let required = format!(
            "each segment sums to 1.0 +/- {} with >= {} support ids",
            t.awareness_tolerance, t.awareness_min_support
        );
        let Some(awareness) = &pillars.awareness else {
            return QualityGateCheck::missing(GateId::Pillar5AwarenessValidity, required);
        };
        let details: Vec<String> = awareness
            .segments
            .iter()
            .filter_map(|s| {
                let total = s.total();
                let support = count_known(&s.support_evidence_ids, known);
                let ok = (total - 1.0).abs() <= t.awareness_tolerance && support >= t.awareness_min_support;
                (!ok).then(|| format!("{}: sum {total:.3}, {support} support ids", s.segment))
            })
            .collect();
        QualityGateCheck::new(
            GateId::Pillar5AwarenessValidity,
            !awareness.segments.is_empty() && details.is_empty(),
            required,
            format!("{} segments, {} invalid", awareness.segments.len(), details.len()),
        )
        .with_details(details)
    }

    fn emotion_dominance(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let t = &self.thresholds;
        let required = format!(
            ">= {} distinct emotions, >= {} with confidence >= {}",
            t.emotion_min_distinct, t.emotion_min_high_confidence, t.emotion_high_confidence
        );
        let Some(drivers) = &pillars.emotional_drivers else {
            return QualityGateCheck::missing(GateId::Pillar6EmotionDominance, required);
        };
        let distinct: BTreeSet<String> = drivers
            .drivers
            .iter()
            .map(|d| d.label.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        let high = drivers
            .drivers
            .iter()
            .filter(|d| d.confidence >= t.emotion_high_confidence)
            .count();
        QualityGateCheck::new(
            GateId::Pillar6EmotionDominance,
            distinct.len() >= t.emotion_min_distinct && high >= t.emotion_min_high_confidence,
            required,
            format!("{} distinct, {high} high confidence", distinct.len()),
        )
    }

    fn proof_coverage(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let min = self.thresholds.proof_min_per_type;
        let required = format!(">= {min} assets and a top-tier asset for each proof type");
        let Some(inventory) = &pillars.proof_inventory else {
            return QualityGateCheck::missing(GateId::Pillar7ProofCoverage, required);
        };
        let per_type: BTreeMap<ProofType, (usize, bool)> = ProofType::ALL
            .into_iter()
            .map(|p| (p, (inventory.count(p), inventory.has_top(p))))
            .collect();
        let details: Vec<String> = per_type
            .iter()
            .filter(|(_, (n, top))| *n < min || !*top)
            .map(|(p, (n, top))| format!("{p:?}: {n} assets, top tier {top}"))
            .collect();
        QualityGateCheck::new(
            GateId::Pillar7ProofCoverage,
            details.is_empty(),
            required,
            per_type
                .iter()
                .map(|(p, (n, _))| format!("{p:?} {n}").to_lowercase())
                .collect::<Vec<_>>()
                .join(", "),
        )
        .with_details(details)
    }

    fn cross_pillar(&self, pillars: &ResearchPillars) -> QualityGateCheck {
        let report = build_cross_pillar_report(pillars, &self.lexicon);
        let mut details = Vec::new();
        details.extend(report.unmatched_objections.iter().map(|o| format!("untraced objection: {o}")));
        details.extend(report.mechanism_notes.iter().cloned());
        details.extend(report.untraceable_emotions.iter().map(|e| format!("untraced emotion: {e}")));
        QualityGateCheck::new(
            GateId::CrossPillarConsistency,
            report.consistent,
            "objections traceable, mechanism aligned, emotions traceable".to_string(),
            format!(
                "objections {}, mechanism {}, emotions {}",
                report.objections_traceable, report.mechanism_aligned, report.emotions_traceable
            ),
        )
        .with_details(details)
    }
}

fn count_known(ids: &[String], known: &HashSet<&str>) -> usize {
    ids.iter()
        .filter(|id| known.contains(id.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

/// Valid quotes whose segment is not a pillar 1 segment, as (quote id, segment).
fn misaligned_quotes(pillars: &ResearchPillars) -> Vec<(String, String)> {
    let Some(bank) = &pillars.voc_bank else {
        return Vec::new();
    };
    bank.valid_quotes()
        .filter(|q| {
            pillars
                .prospect_profile
                .as_ref()
                .is_none_or(|p| !p.has_segment(&q.segment))
        })
        .map(|q| (q.quote_id.clone(), q.segment.clone()))
        .collect()
}

/// Themes among the final 30 entries not seen in any earlier entry.
pub fn new_themes_in_last_30<'a>(themes: impl Iterator<Item = Option<&'a str>>) -> usize {
    let themes: Vec<Option<String>> = themes
        .map(|t| t.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()))
        .collect();
    let split = themes.len().saturating_sub(30);
    let earlier: HashSet<&String> = themes[..split].iter().flatten().collect();
    themes[split..]
        .iter()
        .flatten()
        .filter(|t| !earlier.contains(t))
        .collect::<HashSet<_>>()
        .len()
}
