//! Deterministic, evidence-grounded backfill of pillar fields.
//!
//! Hardening never calls a model and never invents content: every added
//! quote, competitor field, support id or proof asset is copied from an
//! evidence item. Pillars that are missing stay missing. Every action is
//! appended to the [`HardeningLog`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::evidence::{ConflictFlag, EvidenceItem, SourceType};
use crate::gates::GateThresholds;
use crate::lexicon::Lexicon;
use crate::pillars::{
    AwarenessLevel, Competitor, PillarKind, ProofAsset, ProofTier, ProofType, QuoteCategory,
    ResearchPillars, Segment, VocQuote, build_cross_pillar_report,
};
use crate::text;

static STATISTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s?(?:%|percent\b|x\b)|[$€£]\s?\d")
        .expect("statistic pattern is valid")
});

/// A known competitor and the names it goes by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorPattern {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CompetitorPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    fn terms(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|t| text::padded_lower(t).trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn matches_name(&self, name: &str) -> bool {
        let key = text::padded_lower(name).trim().to_string();
        self.terms().any(|t| t == key)
    }
}

/// What hardening is allowed to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardeningPolicy {
    /// Relabel surplus quotes into deficit categories.
    #[serde(default)]
    pub allow_recycling: bool,
    /// Competitors that may be added from evidence. Unlisted names never are.
    #[serde(default)]
    pub competitor_catalog: Vec<CompetitorPattern>,
}

/// One hardening action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardeningAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pillar: Option<PillarKind>,
    pub action: String,
    pub detail: String,
}

/// Ordered record of hardening actions, persisted as `hardening_log.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardeningLog {
    actions: Vec<HardeningAction>,
}

impl HardeningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pillar: Option<PillarKind>, action: &str, detail: impl Into<String>) {
        let detail = detail.into();
        debug!(pillar = ?pillar, action, detail = %detail, "Hardening");
        self.actions.push(HardeningAction {
            pillar,
            action: action.to_string(),
            detail,
        });
    }

    pub fn actions(&self) -> &[HardeningAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn for_action<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a HardeningAction> + 'a {
        self.actions.iter().filter(move |a| a.action == action)
    }

    pub fn extend(&mut self, other: HardeningLog) {
        self.actions.extend(other.actions);
    }
}

/// Backfills under-populated pillars from the evidence ledger.
#[derive(Debug, Clone)]
pub struct Hardener {
    lexicon: Lexicon,
    thresholds: GateThresholds,
    policy: HardeningPolicy,
}

impl Hardener {
    pub fn new(lexicon: Lexicon, thresholds: GateThresholds, policy: HardeningPolicy) -> Self {
        Self {
            lexicon,
            thresholds,
            policy,
        }
    }

    /// Harden `pillars` in place and rebuild the cross-pillar report.
    pub fn harden(&self, evidence: &[EvidenceItem], pillars: &mut ResearchPillars) -> HardeningLog {
        let mut log = HardeningLog::new();
        let usable: Vec<&EvidenceItem> = ranked(evidence)
            .filter(|e| e.conflict_flag != ConflictFlag::HighUnresolved)
            .collect();

        self.remove_invalid_quotes(pillars, &mut log);
        self.mine_quotes(&usable, pillars, &mut log);
        self.expand_competitors(&usable, pillars, &mut log);
        self.top_up_mechanism(&usable, pillars, &mut log);
        self.harden_awareness(&usable, pillars, &mut log);
        self.top_up_proof(&usable, pillars, &mut log);

        let report = build_cross_pillar_report(pillars, &self.lexicon);
        log.push(
            None,
            "rebuild_cross_pillar",
            format!("consistent={}", report.consistent),
        );
        pillars.cross_pillar = Some(report);

        info!(actions = log.len(), "Hardening complete");
        log
    }

    fn remove_invalid_quotes(&self, pillars: &mut ResearchPillars, log: &mut HardeningLog) {
        let Some(bank) = pillars.voc_bank.as_mut() else {
            return;
        };
        let before = bank.quotes.len();
        bank.quotes.retain(|q| q.is_valid());
        let removed = before - bank.quotes.len();
        if removed > 0 {
            log.push(
                Some(PillarKind::VocBank),
                "remove_invalid_quotes",
                format!("removed {removed} unsourced, `other` or malformed quotes"),
            );
        }
    }

    fn mine_quotes(&self, evidence: &[&EvidenceItem], pillars: &mut ResearchPillars, log: &mut HardeningLog) {
        let segments: Vec<Segment> = pillars
            .prospect_profile
            .as_ref()
            .map(|p| p.segments.clone())
            .unwrap_or_default();
        let Some(bank) = pillars.voc_bank.as_mut() else {
            return;
        };

        let mut deficits: BTreeMap<QuoteCategory, usize> = bank
            .valid_counts()
            .into_iter()
            .filter_map(|(c, have)| {
                let need = self.thresholds.voc_min(c).saturating_sub(have);
                (need > 0).then_some((c, need))
            })
            .collect();
        if deficits.is_empty() {
            return;
        }

        let mut used_ids: HashSet<String> = bank.quotes.iter().filter_map(|q| q.evidence_id.clone()).collect();
        let mut seen_text: HashSet<String> = bank.quotes.iter().map(|q| quote_key(&q.text)).collect();
        let mut mined: BTreeMap<QuoteCategory, usize> = BTreeMap::new();

        for item in evidence {
            if deficits.is_empty() {
                break;
            }
            if !item.has_valid_url() || item.source_type == SourceType::Other || used_ids.contains(&item.evidence_id) {
                continue;
            }
            let body = if item.verbatim.trim().is_empty() { &item.claim } else { &item.verbatim };
            if seen_text.contains(&quote_key(body)) {
                continue;
            }
            let padded = text::padded_lower(body);
            let best = deficits
                .keys()
                .map(|c| (*c, text::count_hits(&padded, self.lexicon.category_terms(*c))))
                .filter(|(_, hits)| *hits > 0)
                .fold(None::<(QuoteCategory, usize)>, |best, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });
            let Some((category, _)) = best else {
                continue;
            };

            let quote = VocQuote {
                quote_id: format!("mined_{}", item.evidence_id),
                text: body.clone(),
                category,
                segment: best_segment(body, &segments, &self.lexicon),
                emotion: self.lexicon.infer_emotion(body).map(String::from),
                theme: None,
                source_url: item.source_url.clone(),
                source_type: item.source_type,
                evidence_id: Some(item.evidence_id.clone()),
                provider: item.provider.clone(),
            };
            if !quote.is_valid() {
                continue;
            }
            used_ids.insert(item.evidence_id.clone());
            seen_text.insert(quote_key(body));
            bank.quotes.push(quote);
            *mined.entry(category).or_default() += 1;
            if let Some(need) = deficits.get_mut(&category) {
                *need -= 1;
                if *need == 0 {
                    deficits.remove(&category);
                }
            }
        }

        for (category, n) in &mined {
            log.push(
                Some(PillarKind::VocBank),
                "mine_quotes",
                format!("mined {n} {} quotes from evidence", category.as_str()),
            );
        }

        if deficits.is_empty() {
            return;
        }
        if !self.policy.allow_recycling {
            for (category, need) in &deficits {
                log.push(
                    Some(PillarKind::VocBank),
                    "quote_deficit",
                    format!("{need} {} quotes short; recycling disabled", category.as_str()),
                );
            }
            return;
        }

        let mut counts = bank.valid_counts();
        for (category, need) in deficits {
            let terms = self.lexicon.category_terms(category);
            let mut relabeled = 0;
            for quote in bank.quotes.iter_mut() {
                if relabeled == need {
                    break;
                }
                let from = quote.category;
                if from == category || counts.get(&from).copied().unwrap_or(0) <= self.thresholds.voc_min(from) {
                    continue;
                }
                if text::count_hits(&text::padded_lower(&quote.text), terms) == 0 {
                    continue;
                }
                quote.category = category;
                *counts.entry(from).or_default() -= 1;
                *counts.entry(category).or_default() += 1;
                relabeled += 1;
            }
            log.push(
                Some(PillarKind::VocBank),
                "recycle_quotes",
                format!("relabeled {relabeled} of {need} needed {} quotes", category.as_str()),
            );
        }
    }

    fn expand_competitors(
        &self,
        evidence: &[&EvidenceItem],
        pillars: &mut ResearchPillars,
        log: &mut HardeningLog,
    ) {
        let Some(intel) = pillars.competitive_intel.as_mut() else {
            return;
        };
        let padded: Vec<String> = evidence.iter().map(|e| text::padded_lower(&e.text())).collect();
        let matching = |terms: &[String]| -> Vec<usize> {
            (0..evidence.len())
                .filter(|&i| terms.iter().any(|t| text::has_term(&padded[i], t)))
                .collect()
        };

        for pattern in &self.policy.competitor_catalog {
            if intel.competitors.len() >= self.thresholds.competitor_target {
                break;
            }
            if intel.competitors.iter().any(|c| pattern.matches_name(&c.name)) {
                continue;
            }
            let terms: Vec<String> = pattern.terms().collect();
            if matching(&terms).is_empty() {
                continue;
            }
            intel.competitors.push(Competitor {
                name: pattern.name.clone(),
                ..Default::default()
            });
            log.push(
                Some(PillarKind::CompetitiveIntel),
                "add_competitor",
                format!("{} matched in evidence", pattern.name),
            );
        }

        for competitor in intel.competitors.iter_mut() {
            let mut terms: Vec<String> = vec![text::padded_lower(&competitor.name).trim().to_string()];
            if let Some(pattern) = self
                .policy
                .competitor_catalog
                .iter()
                .find(|p| p.matches_name(&competitor.name))
            {
                terms.extend(pattern.terms());
            }
            terms.retain(|t| !t.is_empty());
            let hits = matching(&terms);
            if hits.is_empty() {
                continue;
            }
            let filled = self.fill_competitor(competitor, &hits, evidence, &padded);
            if !filled.is_empty() {
                log.push(
                    Some(PillarKind::CompetitiveIntel),
                    "fill_competitor",
                    format!("{}: {}", competitor.name, filled.join(", ")),
                );
            }
        }
    }

    fn fill_competitor(
        &self,
        competitor: &mut Competitor,
        hits: &[usize],
        evidence: &[&EvidenceItem],
        padded: &[String],
    ) -> Vec<&'static str> {
        let mut filled = Vec::new();
        let claim = |i: usize| text::truncate_chars(&evidence[i].claim, 200);

        if competitor.positioning.trim().is_empty() {
            competitor.positioning = claim(hits[0]);
            filled.push("positioning");
        }
        if competitor.pricing.trim().is_empty() {
            let priced = hits.iter().copied().find(|&i| {
                text::count_hits(&padded[i], self.lexicon.pricing) > 0 || STATISTIC.is_match(&evidence[i].claim)
            });
            if let Some(i) = priced {
                competitor.pricing = claim(i);
                filled.push("pricing");
            }
        }
        if competitor.strengths.is_empty() {
            competitor.strengths = hits
                .iter()
                .copied()
                .filter(|&i| text::polarity(&evidence[i].claim, &self.lexicon) > 0)
                .take(3)
                .map(claim)
                .collect();
            if !competitor.strengths.is_empty() {
                filled.push("strengths");
            }
        }
        if competitor.weaknesses.is_empty() {
            competitor.weaknesses = hits
                .iter()
                .copied()
                .filter(|&i| text::polarity(&evidence[i].claim, &self.lexicon) < 0)
                .take(3)
                .map(claim)
                .collect();
            if !competitor.weaknesses.is_empty() {
                filled.push("weaknesses");
            }
        }
        for &i in hits {
            if !competitor.evidence_ids.contains(&evidence[i].evidence_id) {
                competitor.evidence_ids.push(evidence[i].evidence_id.clone());
            }
        }
        filled
    }

    fn top_up_mechanism(&self, evidence: &[&EvidenceItem], pillars: &mut ResearchPillars, log: &mut HardeningLog) {
        let Some(mechanism) = pillars.mechanism.as_mut() else {
            return;
        };
        let mech_tokens = text::tokens(
            &format!("{} {}", mechanism.problem_mechanism, mechanism.solution_mechanism),
            &self.lexicon,
        );
        let added = top_up_ids(
            &mut mechanism.supporting_evidence_ids,
            self.thresholds.mechanism_min_support,
            evidence,
            |e| {
                let body = e.text();
                text::count_hits(&text::padded_lower(&body), self.lexicon.mechanism) > 0
                    || text::overlap(&text::tokens(&body, &self.lexicon), &mech_tokens) >= 2
            },
        );
        if added > 0 {
            log.push(
                Some(PillarKind::Mechanism),
                "top_up_support",
                format!("added {added} supporting evidence ids"),
            );
        }
    }

    fn harden_awareness(&self, evidence: &[&EvidenceItem], pillars: &mut ResearchPillars, log: &mut HardeningLog) {
        let Some(awareness) = pillars.awareness.as_mut() else {
            return;
        };
        for segment in awareness.segments.iter_mut() {
            if let Some(note) = normalize_distribution(&mut segment.distribution) {
                log.push(
                    Some(PillarKind::Awareness),
                    "normalize_distribution",
                    format!("{}: {note}", segment.segment),
                );
            }

            let segment_tokens = text::tokens(&segment.segment, &self.lexicon);
            let added = top_up_ids(
                &mut segment.support_evidence_ids,
                self.thresholds.awareness_min_support,
                evidence,
                |e| {
                    let body = e.text();
                    text::count_hits(&text::padded_lower(&body), self.lexicon.awareness) > 0
                        || text::overlap(&text::tokens(&body, &self.lexicon), &segment_tokens) >= 1
                },
            );
            if added > 0 {
                log.push(
                    Some(PillarKind::Awareness),
                    "top_up_support",
                    format!("{}: added {added} support evidence ids", segment.segment),
                );
            }
        }
    }

    fn top_up_proof(&self, evidence: &[&EvidenceItem], pillars: &mut ResearchPillars, log: &mut HardeningLog) {
        let Some(inventory) = pillars.proof_inventory.as_mut() else {
            return;
        };
        let mut used: HashSet<String> = inventory.assets.iter().filter_map(|a| a.evidence_id.clone()).collect();

        for proof_type in ProofType::ALL {
            let need = self.thresholds.proof_min_per_type.saturating_sub(inventory.count(proof_type));
            let mut added = 0;
            for item in evidence {
                if added == need {
                    break;
                }
                if !item.has_valid_url() || used.contains(&item.evidence_id) {
                    continue;
                }
                if !self.proof_types(item).contains(&proof_type) {
                    continue;
                }
                used.insert(item.evidence_id.clone());
                inventory.assets.push(ProofAsset {
                    asset_id: format!("proof_{}", text::short_hash(&format!("{proof_type:?}\u{1f}{}", item.evidence_id), 12)),
                    proof_type,
                    description: text::truncate_chars(&item.claim, 240),
                    source_url: item.source_url.clone(),
                    evidence_id: Some(item.evidence_id.clone()),
                    confidence: item.confidence,
                    tier: ProofTier::for_confidence(item.confidence),
                });
                added += 1;
            }
            if added > 0 {
                log.push(
                    Some(PillarKind::ProofInventory),
                    "top_up_proof",
                    format!("added {added} {proof_type:?} assets").to_lowercase(),
                );
            }

            if !inventory.has_top(proof_type) {
                let best = inventory
                    .assets
                    .iter_mut()
                    .filter(|a| a.proof_type == proof_type)
                    .fold(None::<&mut ProofAsset>, |best, cur| match best {
                        Some(b) if b.confidence >= cur.confidence => Some(b),
                        _ => Some(cur),
                    });
                if let Some(asset) = best {
                    asset.tier = ProofTier::Top;
                    log.push(
                        Some(PillarKind::ProofInventory),
                        "promote_top_tier",
                        format!("{} promoted to top tier", asset.asset_id),
                    );
                }
            }
        }
    }

    /// Proof types an evidence item can back.
    fn proof_types(&self, item: &EvidenceItem) -> Vec<ProofType> {
        let body = item.text();
        let padded = text::padded_lower(&body);
        let mut types = Vec::new();
        if STATISTIC.is_match(&body) {
            types.push(ProofType::Statistical);
        }
        if text::is_quote_like(&body) {
            types.push(ProofType::Testimonial);
        }
        let trusted = item.domain().is_some_and(|d| self.lexicon.is_trusted_host(&d));
        if trusted || text::count_hits(&padded, self.lexicon.authority) > 0 {
            types.push(ProofType::Authority);
        }
        if text::count_hits(&padded, self.lexicon.story) > 0 {
            types.push(ProofType::Story);
        }
        types
    }
}

/// Evidence ordered by confidence, highest first; ledger order on ties.
fn ranked(evidence: &[EvidenceItem]) -> impl Iterator<Item = &EvidenceItem> {
    let mut items: Vec<&EvidenceItem> = evidence.iter().collect();
    items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    items.into_iter()
}

fn quote_key(text: &str) -> String {
    text::padded_lower(text).trim().to_string()
}

/// Segment whose profile text best overlaps `body`, else the first segment.
fn best_segment(body: &str, segments: &[Segment], lexicon: &Lexicon) -> String {
    let tokens = text::tokens(body, lexicon);
    let mut best: Option<(&Segment, usize)> = None;
    for segment in segments {
        let profile = format!(
            "{} {} {} {}",
            segment.name,
            segment.description,
            segment.pains.join(" "),
            segment.desires.join(" ")
        );
        let score = text::overlap(&tokens, &text::tokens(&profile, lexicon));
        if score > 0 && best.is_none_or(|(_, b)| score > b) {
            best = Some((segment, score));
        }
    }
    best.map(|(s, _)| s)
        .or_else(|| segments.first())
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

/// Append matching evidence ids until `ids` holds `min` distinct known ids.
fn top_up_ids(
    ids: &mut Vec<String>,
    min: usize,
    evidence: &[&EvidenceItem],
    matches: impl Fn(&EvidenceItem) -> bool,
) -> usize {
    let known: HashSet<&str> = evidence.iter().map(|e| e.evidence_id.as_str()).collect();
    let present: BTreeSet<String> = ids.iter().filter(|id| known.contains(id.as_str())).cloned().collect();
    let mut need = min.saturating_sub(present.len());
    let mut added = 0;
    for item in evidence {
        if need == 0 {
            break;
        }
        if ids.contains(&item.evidence_id) || !matches(item) {
            continue;
        }
        ids.push(item.evidence_id.clone());
        need -= 1;
        added += 1;
    }
    added
}

/// Clamp negatives to zero and rescale to sum 1. Returns a note when changed.
pub fn normalize_distribution(distribution: &mut BTreeMap<AwarenessLevel, f64>) -> Option<String> {
    let mut clamped = false;
    for value in distribution.values_mut() {
        if !value.is_finite() || *value < 0.0 {
            *value = 0.0;
            clamped = true;
        }
    }
    let sum: f64 = distribution.values().sum();
    if sum <= 0.0 {
        let share = 1.0 / AwarenessLevel::ALL.len() as f64;
        *distribution = AwarenessLevel::ALL.into_iter().map(|l| (l, share)).collect();
        return Some("empty distribution replaced with uniform".to_string());
    }
    if !clamped && (sum - 1.0).abs() <= 1e-9 {
        return None;
    }
    for value in distribution.values_mut() {
        *value /= sum;
    }
    Some(format!("rescaled from sum {sum:.3}"))
}
