//! Typed pillar bodies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::evidence::{SourceType, is_valid_http_url};
use crate::text;

// --- Pillar 1 ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub demographics: Vec<String>,
    #[serde(default)]
    pub psychographics: Vec<String>,
    #[serde(default)]
    pub pains: Vec<String>,
    #[serde(default)]
    pub desires: Vec<String>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub support_evidence_ids: Vec<String>,
}

impl Segment {
    /// Profile fields that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.pains.is_empty() {
            missing.push("pains");
        }
        if self.desires.is_empty() {
            missing.push("desires");
        }
        if self.objections.is_empty() {
            missing.push("objections");
        }
        missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectProfile {
    pub segments: Vec<Segment>,
}

impl ProspectProfile {
    pub fn has_segment(&self, name: &str) -> bool {
        let name = name.trim();
        self.segments
            .iter()
            .any(|s| s.name.trim().eq_ignore_ascii_case(name))
    }
}

// --- Pillar 2 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCategory {
    Pain,
    Desire,
    Objection,
    Trigger,
    Proof,
}

impl QuoteCategory {
    pub const ALL: [QuoteCategory; 5] = [
        QuoteCategory::Pain,
        QuoteCategory::Desire,
        QuoteCategory::Objection,
        QuoteCategory::Trigger,
        QuoteCategory::Proof,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteCategory::Pain => "pain",
            QuoteCategory::Desire => "desire",
            QuoteCategory::Objection => "objection",
            QuoteCategory::Trigger => "trigger",
            QuoteCategory::Proof => "proof",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocQuote {
    pub quote_id: String,
    pub text: String,
    pub category: QuoteCategory,
    #[serde(default)]
    pub segment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub source_url: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
    #[serde(default)]
    pub provider: String,
}

impl VocQuote {
    /// Sourced, non-`other`, non-empty and free of leaked markup.
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty()
            && !text::looks_like_leakage(&self.text)
            && is_valid_http_url(&self.source_url)
            && self.source_type != SourceType::Other
    }

    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.source_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocBank {
    pub quotes: Vec<VocQuote>,
}

impl VocBank {
    pub fn valid_quotes(&self) -> impl Iterator<Item = &VocQuote> {
        self.quotes.iter().filter(|q| q.is_valid())
    }

    /// Valid quotes per category; every category is present.
    pub fn valid_counts(&self) -> BTreeMap<QuoteCategory, usize> {
        let mut counts: BTreeMap<QuoteCategory, usize> =
            QuoteCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        for quote in self.valid_quotes() {
            *counts.entry(quote.category).or_default() += 1;
        }
        counts
    }

    pub fn quote_ids(&self) -> BTreeSet<&str> {
        self.quotes.iter().map(|q| q.quote_id.as_str()).collect()
    }
}

// --- Pillar 3 ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub positioning: String,
    #[serde(default)]
    pub pricing: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

impl Competitor {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.positioning.trim().is_empty() {
            missing.push("positioning");
        }
        if self.pricing.trim().is_empty() {
            missing.push("pricing");
        }
        if self.strengths.is_empty() {
            missing.push("strengths");
        }
        if self.weaknesses.is_empty() {
            missing.push("weaknesses");
        }
        missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveIntel {
    pub competitors: Vec<Competitor>,
}

// --- Pillar 4 ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismAnalysis {
    #[serde(default)]
    pub problem_mechanism: String,
    #[serde(default)]
    pub solution_mechanism: String,
    #[serde(default)]
    pub supporting_evidence_ids: Vec<String>,
}

impl MechanismAnalysis {
    pub fn is_two_part(&self) -> bool {
        !self.problem_mechanism.trim().is_empty() && !self.solution_mechanism.trim().is_empty()
    }
}

// --- Pillar 5 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwarenessLevel {
    Unaware,
    ProblemAware,
    SolutionAware,
    ProductAware,
    MostAware,
}

impl AwarenessLevel {
    pub const ALL: [AwarenessLevel; 5] = [
        AwarenessLevel::Unaware,
        AwarenessLevel::ProblemAware,
        AwarenessLevel::SolutionAware,
        AwarenessLevel::ProductAware,
        AwarenessLevel::MostAware,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentAwareness {
    pub segment: String,
    #[serde(default)]
    pub distribution: BTreeMap<AwarenessLevel, f64>,
    #[serde(default)]
    pub support_evidence_ids: Vec<String>,
}

impl SegmentAwareness {
    pub fn total(&self) -> f64 {
        self.distribution.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessClassification {
    pub segments: Vec<SegmentAwareness>,
}

// --- Pillar 6 ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionDriver {
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Collectors whose reports proposed this driver.
    #[serde(default)]
    pub providers: BTreeSet<String>,
    #[serde(default)]
    pub quote_ids: Vec<String>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    /// Share of attached quotes among all quotes, in [0, 1].
    #[serde(default)]
    pub share: f64,
    #[serde(default)]
    pub dominant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lf8Category {
    Survival,
    FoodDrink,
    FreedomFromFear,
    Companionship,
    ComfortableLiving,
    Superiority,
    CareProtection,
    SocialApproval,
}

impl Lf8Category {
    pub const ALL: [Lf8Category; 8] = [
        Lf8Category::Survival,
        Lf8Category::FoodDrink,
        Lf8Category::FreedomFromFear,
        Lf8Category::Companionship,
        Lf8Category::ComfortableLiving,
        Lf8Category::Superiority,
        Lf8Category::CareProtection,
        Lf8Category::SocialApproval,
    ];
}

/// One per-segment desire classification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lf8Row {
    pub segment: String,
    pub category: Lf8Category,
    pub driver_labels: Vec<String>,
    pub quote_ids: Vec<String>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    pub domains: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverSource {
    /// Clustered from collector reports and attached quotes.
    CollectorClusters,
    /// Counted from quote emotion labels.
    VocFallback,
    /// Returned by the external synthesizer.
    #[default]
    Synthesizer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalDrivers {
    pub drivers: Vec<EmotionDriver>,
    #[serde(default)]
    pub lf8: Vec<Lf8Row>,
    #[serde(default)]
    pub source: DriverSource,
}

// --- Pillar 7 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    Statistical,
    Testimonial,
    Authority,
    Story,
}

impl ProofType {
    pub const ALL: [ProofType; 4] = [
        ProofType::Statistical,
        ProofType::Testimonial,
        ProofType::Authority,
        ProofType::Story,
    ];
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProofTier {
    #[default]
    Supporting,
    Strong,
    Top,
}

impl ProofTier {
    pub fn for_confidence(confidence: f64) -> Self {
        if confidence >= 0.80 {
            ProofTier::Top
        } else if confidence >= 0.60 {
            ProofTier::Strong
        } else {
            ProofTier::Supporting
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofAsset {
    pub asset_id: String,
    pub proof_type: ProofType,
    pub description: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub tier: ProofTier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofInventory {
    pub assets: Vec<ProofAsset>,
}

impl ProofInventory {
    pub fn count(&self, proof_type: ProofType) -> usize {
        self.assets.iter().filter(|a| a.proof_type == proof_type).count()
    }

    pub fn has_top(&self, proof_type: ProofType) -> bool {
        self.assets
            .iter()
            .any(|a| a.proof_type == proof_type && a.tier == ProofTier::Top)
    }
}

// --- Cross-pillar ---

/// Cross-validation of pillars against each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossPillarReport {
    pub objections_traceable: bool,
    #[serde(default)]
    pub unmatched_objections: Vec<String>,
    pub mechanism_aligned: bool,
    #[serde(default)]
    pub mechanism_notes: Vec<String>,
    pub emotions_traceable: bool,
    #[serde(default)]
    pub untraceable_emotions: Vec<String>,
    pub consistent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(url: &str, source_type: SourceType) -> VocQuote {
        VocQuote {
            quote_id: "q1".into(),
            text: "I gave up after the third failed export".into(),
            category: QuoteCategory::Pain,
            segment: "Agencies".into(),
            emotion: None,
            theme: None,
            source_url: url.into(),
            source_type,
            evidence_id: None,
            provider: "alpha".into(),
        }
    }

    #[test]
    fn test_quote_validity() {
        assert!(quote("https://g2.com/x", SourceType::Review).is_valid());
        assert!(!quote("", SourceType::Review).is_valid());
        assert!(!quote("https://g2.com/x", SourceType::Other).is_valid());
        let mut leaked = quote("https://g2.com/x", SourceType::Review);
        leaked.text = "{\"text\": \"x\"}".into();
        assert!(!leaked.is_valid());
    }

    #[test]
    fn test_valid_counts_cover_all_categories() {
        let bank = VocBank {
            quotes: vec![
                quote("https://g2.com/x", SourceType::Review),
                quote("", SourceType::Review),
            ],
        };
        let counts = bank.valid_counts();
        assert_eq!(counts.len(), 5);
        assert_eq!(counts[&QuoteCategory::Pain], 1);
        assert_eq!(counts[&QuoteCategory::Proof], 0);
    }

    #[test]
    fn test_proof_tier_thresholds() {
        assert_eq!(ProofTier::for_confidence(0.85), ProofTier::Top);
        assert_eq!(ProofTier::for_confidence(0.80), ProofTier::Top);
        assert_eq!(ProofTier::for_confidence(0.6), ProofTier::Strong);
        assert_eq!(ProofTier::for_confidence(0.59), ProofTier::Supporting);
        assert!(ProofTier::Top > ProofTier::Strong);
    }

    #[test]
    fn test_segment_lookup_is_case_insensitive() {
        let profile = ProspectProfile {
            segments: vec![Segment {
                name: "Agency Owners".into(),
                ..Default::default()
            }],
        };
        assert!(profile.has_segment(" agency owners "));
        assert!(!profile.has_segment("Freelancers"));
    }

    #[test]
    fn test_segment_missing_fields() {
        let seg = Segment {
            name: "Agencies".into(),
            description: "Small agencies".into(),
            pains: vec!["slow exports".into()],
            ..Default::default()
        };
        assert_eq!(seg.missing_fields(), vec!["desires", "objections"]);
    }

    #[test]
    fn test_awareness_distribution_serializes_with_level_keys() {
        let seg = SegmentAwareness {
            segment: "Agencies".into(),
            distribution: BTreeMap::from([(AwarenessLevel::ProblemAware, 1.0)]),
            support_evidence_ids: vec![],
        };
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["distribution"]["problem_aware"], 1.0);
    }
}
