//! The seven research pillars, their dependency table and synthesis.
//!
//! Pillar kinds form a closed enum with a static dependency table, so the
//! scheduler and the gate → pillar map are exhaustively checked.

pub mod consistency;
pub mod emotion;
pub mod model;
pub mod scheduler;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use consistency::build_cross_pillar_report;
pub use emotion::EmotionClusterer;
pub use model::*;
pub use scheduler::{PillarSynthesizer, SynthesisRequest, SynthesisScheduler};

/// One of the seven structured research sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PillarKind {
    #[serde(rename = "pillar_1")]
    ProspectProfile,
    #[serde(rename = "pillar_2")]
    VocBank,
    #[serde(rename = "pillar_3")]
    CompetitiveIntel,
    #[serde(rename = "pillar_4")]
    Mechanism,
    #[serde(rename = "pillar_5")]
    Awareness,
    #[serde(rename = "pillar_6")]
    EmotionalDrivers,
    #[serde(rename = "pillar_7")]
    ProofInventory,
}

impl PillarKind {
    pub const ALL: [PillarKind; 7] = [
        PillarKind::ProspectProfile,
        PillarKind::VocBank,
        PillarKind::CompetitiveIntel,
        PillarKind::Mechanism,
        PillarKind::Awareness,
        PillarKind::EmotionalDrivers,
        PillarKind::ProofInventory,
    ];

    pub fn number(self) -> u8 {
        match self {
            PillarKind::ProspectProfile => 1,
            PillarKind::VocBank => 2,
            PillarKind::CompetitiveIntel => 3,
            PillarKind::Mechanism => 4,
            PillarKind::Awareness => 5,
            PillarKind::EmotionalDrivers => 6,
            PillarKind::ProofInventory => 7,
        }
    }

    /// Wire id, e.g. `pillar_3`.
    pub fn id(self) -> String {
        format!("pillar_{}", self.number())
    }

    pub fn title(self) -> &'static str {
        match self {
            PillarKind::ProspectProfile => "Prospect profile",
            PillarKind::VocBank => "Voice of customer bank",
            PillarKind::CompetitiveIntel => "Competitive intelligence",
            PillarKind::Mechanism => "Mechanism analysis",
            PillarKind::Awareness => "Awareness classification",
            PillarKind::EmotionalDrivers => "Emotional drivers",
            PillarKind::ProofInventory => "Proof inventory",
        }
    }

    /// Pillars that must be synthesized before this one.
    pub fn dependencies(self) -> &'static [PillarKind] {
        match self {
            PillarKind::Awareness => &[
                PillarKind::ProspectProfile,
                PillarKind::VocBank,
                PillarKind::CompetitiveIntel,
                PillarKind::Mechanism,
            ],
            PillarKind::EmotionalDrivers => &[PillarKind::VocBank],
            _ => &[],
        }
    }

    /// First-wave pillars have no inter-pillar dependency.
    pub fn is_first_wave(self) -> bool {
        self.dependencies().is_empty()
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.number() == n)
    }

    /// Parse `pillar_3`, `pillar 3`, `p3`, `3`, or a short name such as `voc`.
    pub fn parse(label: &str) -> Option<Self> {
        let key = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let digits = key
            .strip_prefix("pillar_")
            .or_else(|| key.strip_prefix("pillar"))
            .or_else(|| key.strip_prefix('p'))
            .unwrap_or(&key);
        if let Ok(n) = digits.parse::<u8>() {
            return Self::from_number(n);
        }
        match key.as_str() {
            "prospect_profile" | "prospect" | "profile" | "segments" => Some(PillarKind::ProspectProfile),
            "voc" | "voc_bank" | "quotes" => Some(PillarKind::VocBank),
            "competitive_intel" | "competitors" | "competition" => Some(PillarKind::CompetitiveIntel),
            "mechanism" | "mechanism_analysis" => Some(PillarKind::Mechanism),
            "awareness" | "awareness_classification" => Some(PillarKind::Awareness),
            "emotion" | "emotions" | "emotional_drivers" => Some(PillarKind::EmotionalDrivers),
            "proof" | "proof_inventory" => Some(PillarKind::ProofInventory),
            _ => None,
        }
    }
}

impl fmt::Display for PillarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pillar_{}", self.number())
    }
}

/// A synthesized pillar of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pillar", content = "body")]
pub enum PillarObject {
    #[serde(rename = "pillar_1")]
    ProspectProfile(ProspectProfile),
    #[serde(rename = "pillar_2")]
    VocBank(VocBank),
    #[serde(rename = "pillar_3")]
    CompetitiveIntel(CompetitiveIntel),
    #[serde(rename = "pillar_4")]
    Mechanism(MechanismAnalysis),
    #[serde(rename = "pillar_5")]
    Awareness(AwarenessClassification),
    #[serde(rename = "pillar_6")]
    EmotionalDrivers(EmotionalDrivers),
    #[serde(rename = "pillar_7")]
    ProofInventory(ProofInventory),
}

impl PillarObject {
    pub fn kind(&self) -> PillarKind {
        match self {
            PillarObject::ProspectProfile(_) => PillarKind::ProspectProfile,
            PillarObject::VocBank(_) => PillarKind::VocBank,
            PillarObject::CompetitiveIntel(_) => PillarKind::CompetitiveIntel,
            PillarObject::Mechanism(_) => PillarKind::Mechanism,
            PillarObject::Awareness(_) => PillarKind::Awareness,
            PillarObject::EmotionalDrivers(_) => PillarKind::EmotionalDrivers,
            PillarObject::ProofInventory(_) => PillarKind::ProofInventory,
        }
    }
}

/// The full set of pillars for a run. Any pillar may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchPillars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prospect_profile: Option<ProspectProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voc_bank: Option<VocBank>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitive_intel: Option<CompetitiveIntel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<MechanismAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awareness: Option<AwarenessClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_drivers: Option<EmotionalDrivers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_inventory: Option<ProofInventory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_pillar: Option<CrossPillarReport>,
}

impl ResearchPillars {
    pub fn get(&self, kind: PillarKind) -> Option<PillarObject> {
        match kind {
            PillarKind::ProspectProfile => self.prospect_profile.clone().map(PillarObject::ProspectProfile),
            PillarKind::VocBank => self.voc_bank.clone().map(PillarObject::VocBank),
            PillarKind::CompetitiveIntel => self.competitive_intel.clone().map(PillarObject::CompetitiveIntel),
            PillarKind::Mechanism => self.mechanism.clone().map(PillarObject::Mechanism),
            PillarKind::Awareness => self.awareness.clone().map(PillarObject::Awareness),
            PillarKind::EmotionalDrivers => self.emotional_drivers.clone().map(PillarObject::EmotionalDrivers),
            PillarKind::ProofInventory => self.proof_inventory.clone().map(PillarObject::ProofInventory),
        }
    }

    pub fn contains(&self, kind: PillarKind) -> bool {
        match kind {
            PillarKind::ProspectProfile => self.prospect_profile.is_some(),
            PillarKind::VocBank => self.voc_bank.is_some(),
            PillarKind::CompetitiveIntel => self.competitive_intel.is_some(),
            PillarKind::Mechanism => self.mechanism.is_some(),
            PillarKind::Awareness => self.awareness.is_some(),
            PillarKind::EmotionalDrivers => self.emotional_drivers.is_some(),
            PillarKind::ProofInventory => self.proof_inventory.is_some(),
        }
    }

    /// Store `pillar` in its slot, replacing any previous value.
    pub fn insert(&mut self, pillar: PillarObject) {
        match pillar {
            PillarObject::ProspectProfile(p) => self.prospect_profile = Some(p),
            PillarObject::VocBank(p) => self.voc_bank = Some(p),
            PillarObject::CompetitiveIntel(p) => self.competitive_intel = Some(p),
            PillarObject::Mechanism(p) => self.mechanism = Some(p),
            PillarObject::Awareness(p) => self.awareness = Some(p),
            PillarObject::EmotionalDrivers(p) => self.emotional_drivers = Some(p),
            PillarObject::ProofInventory(p) => self.proof_inventory = Some(p),
        }
    }

    /// The already-synthesized dependencies of `kind`.
    pub fn dependencies_for(&self, kind: PillarKind) -> BTreeMap<PillarKind, PillarObject> {
        kind.dependencies()
            .iter()
            .filter_map(|dep| self.get(*dep).map(|p| (*dep, p)))
            .collect()
    }

    pub fn present(&self) -> Vec<PillarKind> {
        PillarKind::ALL
            .into_iter()
            .filter(|k| self.contains(*k))
            .collect()
    }

    /// Segment names from pillar 1, in order.
    pub fn segment_names(&self) -> Vec<String> {
        self.prospect_profile
            .as_ref()
            .map(|p| p.segments.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pillar_kind_wire_ids() {
        assert_eq!(PillarKind::VocBank.to_string(), "pillar_2");
        assert_eq!(
            serde_json::to_string(&PillarKind::ProofInventory).unwrap(),
            "\"pillar_7\""
        );
        let k: PillarKind = serde_json::from_str("\"pillar_5\"").unwrap();
        assert_eq!(k, PillarKind::Awareness);
    }

    #[test]
    fn test_first_wave() {
        let first: Vec<u8> = PillarKind::ALL
            .into_iter()
            .filter(|k| k.is_first_wave())
            .map(|k| k.number())
            .collect();
        assert_eq!(first, vec![1, 2, 3, 4, 7]);
    }

    #[test]
    fn test_dependencies_point_backwards() {
        for kind in PillarKind::ALL {
            for dep in kind.dependencies() {
                assert!(dep.is_first_wave(), "{kind} depends on non-first-wave {dep}");
            }
        }
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(PillarKind::parse("pillar_3"), Some(PillarKind::CompetitiveIntel));
        assert_eq!(PillarKind::parse("Pillar 6"), Some(PillarKind::EmotionalDrivers));
        assert_eq!(PillarKind::parse("p4"), Some(PillarKind::Mechanism));
        assert_eq!(PillarKind::parse("7"), Some(PillarKind::ProofInventory));
        assert_eq!(PillarKind::parse("voc"), Some(PillarKind::VocBank));
        assert_eq!(PillarKind::parse("pillar_9"), None);
        assert_eq!(PillarKind::parse("pricing"), None);
    }

    #[test]
    fn test_insert_get_and_dependencies() {
        let mut pillars = ResearchPillars::default();
        assert!(pillars.present().is_empty());
        pillars.insert(PillarObject::VocBank(VocBank::default()));
        pillars.insert(PillarObject::Mechanism(MechanismAnalysis::default()));
        assert!(pillars.contains(PillarKind::VocBank));
        assert_eq!(
            pillars.get(PillarKind::VocBank).map(|p| p.kind()),
            Some(PillarKind::VocBank)
        );

        let deps = pillars.dependencies_for(PillarKind::Awareness);
        assert_eq!(
            deps.keys().copied().collect::<Vec<_>>(),
            vec![PillarKind::VocBank, PillarKind::Mechanism]
        );
    }

    #[test]
    fn test_pillar_object_serializes_with_tag() {
        let obj = PillarObject::Mechanism(MechanismAnalysis {
            problem_mechanism: "a".into(),
            solution_mechanism: "b".into(),
            supporting_evidence_ids: vec![],
        });
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["pillar"], "pillar_4");
        let back: PillarObject = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }
}
