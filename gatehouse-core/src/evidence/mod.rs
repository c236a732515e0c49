//! Evidence ledger types, normalization, URL canonicalization and dedup.
//!
//! An [`EvidenceItem`] is an atomic, sourced claim. Items are created by the
//! [`normalize::EvidenceNormalizer`] from free-text collector reports or
//! pre-structured rows, collapsed by [`dedup::dedupe`], and later mutated only
//! in two ways: corroboration boosts and contradiction flags.

pub mod canonical;
pub mod dedup;
pub mod normalize;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pillars::PillarKind;

pub use canonical::{canonicalize_url, is_valid_http_url};
pub use dedup::{dedupe, semantic_hash};
pub use normalize::EvidenceNormalizer;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Review,
    Reddit,
    Forum,
    AdLibrary,
    LandingPage,
    Support,
    Survey,
    Social,
    Other,
}

impl SourceType {
    pub const ALL: [SourceType; 9] = [
        SourceType::Review,
        SourceType::Reddit,
        SourceType::Forum,
        SourceType::AdLibrary,
        SourceType::LandingPage,
        SourceType::Support,
        SourceType::Survey,
        SourceType::Social,
        SourceType::Other,
    ];

    /// Starting confidence for evidence of this type.
    pub fn base_weight(self) -> f64 {
        match self {
            SourceType::Review => 0.72,
            SourceType::Survey => 0.70,
            SourceType::Reddit => 0.66,
            SourceType::Support => 0.64,
            SourceType::Forum => 0.62,
            SourceType::AdLibrary => 0.60,
            SourceType::Social => 0.58,
            SourceType::LandingPage => 0.55,
            SourceType::Other => 0.45,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Review => "review",
            SourceType::Reddit => "reddit",
            SourceType::Forum => "forum",
            SourceType::AdLibrary => "ad_library",
            SourceType::LandingPage => "landing_page",
            SourceType::Support => "support",
            SourceType::Survey => "survey",
            SourceType::Social => "social",
            SourceType::Other => "other",
        }
    }

    /// Parse a collector-supplied label. Accepts a few common spellings.
    pub fn parse(label: &str) -> Option<Self> {
        let key = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "review" | "reviews" => Some(SourceType::Review),
            "reddit" => Some(SourceType::Reddit),
            "forum" | "forums" => Some(SourceType::Forum),
            "ad_library" | "ads" | "ad" => Some(SourceType::AdLibrary),
            "landing_page" | "landing" | "website" => Some(SourceType::LandingPage),
            "support" => Some(SourceType::Support),
            "survey" => Some(SourceType::Survey),
            "social" => Some(SourceType::Social),
            "other" => Some(SourceType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contradiction flag carried by an evidence item.
///
/// Ordering is the severity ranking used by flag propagation:
/// `None < Low < Medium < HighUnresolved`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ConflictFlag {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high_unresolved")]
    HighUnresolved,
}

impl ConflictFlag {
    pub fn is_none(&self) -> bool {
        matches!(self, ConflictFlag::None)
    }
}

/// An atomic, sourced claim in the evidence ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Content hash of (claim, source_url, position).
    pub evidence_id: String,
    /// Normalized statement.
    pub claim: String,
    /// Quoted fragment, at most 300 characters.
    pub verbatim: String,
    /// Canonical absolute http(s) URL, or empty.
    #[serde(default)]
    pub source_url: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default)]
    pub pillar_tags: BTreeSet<PillarKind>,
    /// Always within [0, 1].
    pub confidence: f64,
    /// Collector that produced this item.
    pub provider: String,
    #[serde(default)]
    pub conflict_flag: ConflictFlag,
    /// Distinct source keys already counted toward the corroboration boost.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub corroborating_sources: BTreeSet<String>,
}

impl EvidenceItem {
    /// Dedup/corroboration key: the canonical URL, or a provider fallback.
    pub fn source_key(&self) -> String {
        if self.source_url.is_empty() {
            format!("provider:{}", self.provider)
        } else {
            self.source_url.clone()
        }
    }

    pub fn has_valid_url(&self) -> bool {
        is_valid_http_url(&self.source_url)
    }

    /// Host of the source URL, without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.source_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }

    /// Claim and verbatim joined, for lexical matching.
    pub fn text(&self) -> String {
        if self.verbatim == self.claim {
            self.claim.clone()
        } else {
            format!("{} {}", self.claim, self.verbatim)
        }
    }
}

/// A pre-structured row as emitted by a collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub claim: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pillar_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Aggregate view of an evidence ledger, persisted as `evidence_summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub total: usize,
    pub by_source_type: BTreeMap<SourceType, usize>,
    pub by_provider: BTreeMap<String, usize>,
    pub by_pillar: BTreeMap<PillarKind, usize>,
    pub by_conflict_flag: BTreeMap<String, usize>,
    pub with_valid_url: usize,
    pub mean_confidence: f64,
}

impl EvidenceSummary {
    pub fn from_items(items: &[EvidenceItem]) -> Self {
        let mut summary = Self {
            total: items.len(),
            ..Default::default()
        };
        let mut confidence_sum = 0.0;
        for item in items {
            *summary.by_source_type.entry(item.source_type).or_default() += 1;
            *summary.by_provider.entry(item.provider.clone()).or_default() += 1;
            for tag in &item.pillar_tags {
                *summary.by_pillar.entry(*tag).or_default() += 1;
            }
            if !item.conflict_flag.is_none() {
                let key = serde_json::to_value(item.conflict_flag)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                *summary.by_conflict_flag.entry(key).or_default() += 1;
            }
            if item.has_valid_url() {
                summary.with_valid_url += 1;
            }
            confidence_sum += item.confidence;
        }
        if !items.is_empty() {
            summary.mean_confidence = confidence_sum / items.len() as f64;
        }
        summary
    }

    /// Number of distinct source types present.
    pub fn source_type_count(&self) -> usize {
        self.by_source_type.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build an evidence item with sensible defaults for tests.
    pub fn item(id: &str, claim: &str, url: &str, provider: &str, confidence: f64) -> EvidenceItem {
        EvidenceItem {
            evidence_id: id.to_string(),
            claim: claim.to_string(),
            verbatim: claim.to_string(),
            source_url: url.to_string(),
            source_type: SourceType::Review,
            published_date: None,
            pillar_tags: BTreeSet::from([PillarKind::VocBank]),
            confidence,
            provider: provider.to_string(),
            conflict_flag: ConflictFlag::None,
            corroborating_sources: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::item;
    use super::*;

    #[test]
    fn test_conflict_flag_ranking() {
        assert!(ConflictFlag::None < ConflictFlag::Low);
        assert!(ConflictFlag::Low < ConflictFlag::Medium);
        assert!(ConflictFlag::Medium < ConflictFlag::HighUnresolved);
    }

    #[test]
    fn test_conflict_flag_serializes_to_wire_strings() {
        assert_eq!(serde_json::to_string(&ConflictFlag::None).unwrap(), "\"\"");
        assert_eq!(
            serde_json::to_string(&ConflictFlag::HighUnresolved).unwrap(),
            "\"high_unresolved\""
        );
        let parsed: ConflictFlag = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, ConflictFlag::Medium);
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!(SourceType::parse("Ad Library"), Some(SourceType::AdLibrary));
        assert_eq!(SourceType::parse("landing-page"), Some(SourceType::LandingPage));
        assert_eq!(SourceType::parse("podcast"), None);
    }

    #[test]
    fn test_source_key_falls_back_to_provider() {
        let with_url = item("e1", "claim", "https://example.com/a", "alpha", 0.5);
        let without = item("e2", "claim", "", "alpha", 0.5);
        assert_eq!(with_url.source_key(), "https://example.com/a");
        assert_eq!(without.source_key(), "provider:alpha");
    }

    #[test]
    fn test_domain_strips_www() {
        let e = item("e1", "claim", "https://www.trustpilot.com/review/x", "alpha", 0.5);
        assert_eq!(e.domain().as_deref(), Some("trustpilot.com"));
    }

    #[test]
    fn test_summary_counts() {
        let mut a = item("e1", "claim a", "https://a.com/x", "alpha", 0.6);
        let mut b = item("e2", "claim b", "", "beta", 0.8);
        b.source_type = SourceType::Reddit;
        a.conflict_flag = ConflictFlag::Low;
        let summary = EvidenceSummary::from_items(&[a, b]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.source_type_count(), 2);
        assert_eq!(summary.with_valid_url, 1);
        assert_eq!(summary.by_conflict_flag.get("low"), Some(&1));
        assert!((summary.mean_confidence - 0.7).abs() < 1e-9);
    }
}
