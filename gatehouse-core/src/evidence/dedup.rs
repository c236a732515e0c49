//! Two-tier evidence dedup with incremental corroboration.
//!
//! Tier A collapses items sharing a source key and semantic hash. Tier B
//! (semantic) collapses items sharing only the semantic hash, unions their
//! pillar tags and credits the survivor for each distinct corroborating
//! source. The boost is tracked in `corroborating_sources`, so running dedup
//! again over its own output changes nothing.

use std::collections::{BTreeSet, HashMap};

use super::EvidenceItem;
use crate::lexicon::Lexicon;
use crate::text;

const BOOST_STEP: f64 = 0.05;
const BOOST_MAX: f64 = 0.20;
const CONFIDENCE_CAP: f64 = 0.97;

/// Hash of the sorted, unique, stopword-filtered tokens of claim and verbatim.
pub fn semantic_hash(item: &EvidenceItem, lexicon: &Lexicon) -> String {
    let toks = text::tokens(&format!("{} {}", item.claim, item.verbatim), lexicon);
    let basis = if toks.is_empty() {
        text::collapse_whitespace(&item.claim.to_lowercase())
    } else {
        toks.into_iter().collect::<Vec<_>>().join(" ")
    };
    text::short_hash(&basis, 32)
}

/// Total boost earned by an item with `sources` distinct corroborating sources.
fn corroboration_boost(sources: usize) -> f64 {
    (BOOST_STEP * sources.saturating_sub(1) as f64).min(BOOST_MAX)
}

/// Collapse duplicates. Order of first occurrence is preserved.
pub fn dedupe(items: Vec<EvidenceItem>, semantic: bool, lexicon: &Lexicon) -> Vec<EvidenceItem> {
    let exact = dedupe_exact(items, lexicon);
    if semantic {
        dedupe_semantic(exact, lexicon)
    } else {
        exact
    }
}

fn dedupe_exact(items: Vec<EvidenceItem>, lexicon: &Lexicon) -> Vec<EvidenceItem> {
    let mut out: Vec<EvidenceItem> = Vec::with_capacity(items.len());
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for item in items {
        let key = (item.source_key(), semantic_hash(&item, lexicon));
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut out[i];
                let mut sources = std::mem::take(&mut kept.corroborating_sources);
                let flag = kept.conflict_flag.max(item.conflict_flag);
                if item.confidence > kept.confidence {
                    // The survivor has only been credited for its own sources.
                    let credited = credited_sources(&item);
                    sources.extend(item.corroborating_sources.iter().cloned());
                    *kept = item;
                    credit(kept, credited, sources.len());
                } else {
                    let credited = sources.len().max(1);
                    sources.extend(item.corroborating_sources.iter().cloned());
                    credit(kept, credited, sources.len());
                }
                kept.corroborating_sources = sources;
                kept.conflict_flag = flag;
            }
            None => {
                index.insert(key, out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Raise `item` by the boost for `sources` not yet covered by `credited`.
fn credit(item: &mut EvidenceItem, credited: usize, sources: usize) {
    let gain = corroboration_boost(sources) - corroboration_boost(credited);
    if gain > 0.0 {
        item.confidence = item.confidence.max((item.confidence + gain).min(CONFIDENCE_CAP));
    }
}

struct Group {
    item: EvidenceItem,
    sources: BTreeSet<String>,
    /// Sources already credited in the kept item's confidence.
    credited: usize,
}

fn credited_sources(item: &EvidenceItem) -> usize {
    item.corroborating_sources.len().max(1)
}

fn dedupe_semantic(items: Vec<EvidenceItem>, lexicon: &Lexicon) -> Vec<EvidenceItem> {
    let mut groups: Vec<Group> = Vec::with_capacity(items.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        let hash = semantic_hash(&item, lexicon);
        let mut sources = item.corroborating_sources.clone();
        sources.insert(item.source_key());

        match index.get(&hash) {
            Some(&i) => {
                let group = &mut groups[i];
                group.sources.extend(sources);
                let mut tags = std::mem::take(&mut group.item.pillar_tags);
                tags.extend(item.pillar_tags.iter().copied());
                let flag = group.item.conflict_flag.max(item.conflict_flag);
                if item.confidence > group.item.confidence {
                    group.credited = credited_sources(&item);
                    group.item = item;
                }
                group.item.pillar_tags = tags;
                group.item.conflict_flag = flag;
            }
            None => {
                index.insert(hash, groups.len());
                groups.push(Group {
                    credited: credited_sources(&item),
                    item,
                    sources,
                });
            }
        }
    }

    groups
        .into_iter()
        .map(|Group { mut item, sources, credited }| {
            if sources.len() > 1 {
                credit(&mut item, credited, sources.len());
                item.corroborating_sources = sources;
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::ConflictFlag;
    use crate::evidence::canonicalize_url;
    use crate::evidence::test_support::item;
    use crate::pillars::PillarKind;

    const CLAIM: &str = "Onboarding takes far too long for small agency teams";

    #[test]
    fn test_same_canonical_url_collapses_without_boost() {
        let a = item(
            "e1",
            CLAIM,
            &canonicalize_url("https://X.com/a?utm_source=y"),
            "alpha",
            0.6,
        );
        let b = item("e2", CLAIM, &canonicalize_url("https://x.com/a/"), "beta", 0.7);
        let out = dedupe(vec![a, b], true, &Lexicon::v1());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].evidence_id, "e2");
        assert!((out[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let a = item("e1", CLAIM, "https://a.com/x", "alpha", 0.6);
        let b = item("e2", CLAIM, "https://a.com/x", "beta", 0.6);
        let out = dedupe(vec![a, b], false, &Lexicon::v1());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].evidence_id, "e1");
    }

    #[test]
    fn test_exact_only_keeps_distinct_sources() {
        let a = item("e1", CLAIM, "https://a.com/x", "alpha", 0.6);
        let b = item("e2", CLAIM, "https://b.com/y", "alpha", 0.6);
        assert_eq!(dedupe(vec![a, b], false, &Lexicon::v1()).len(), 2);
    }

    #[test]
    fn test_semantic_merge_boosts_and_unions_tags() {
        let a = item("e1", CLAIM, "https://a.com/x", "alpha", 0.6);
        let mut b = item("e2", "onboarding takes FAR too long, for small agency teams!", "https://b.com/y", "beta", 0.5);
        b.pillar_tags = [PillarKind::ProspectProfile].into_iter().collect();
        b.conflict_flag = ConflictFlag::Low;

        let out = dedupe(vec![a, b], true, &Lexicon::v1());
        assert_eq!(out.len(), 1);
        let merged = &out[0];
        assert_eq!(merged.evidence_id, "e1");
        assert!((merged.confidence - 0.65).abs() < 1e-9);
        assert!(merged.pillar_tags.contains(&PillarKind::VocBank));
        assert!(merged.pillar_tags.contains(&PillarKind::ProspectProfile));
        assert_eq!(merged.conflict_flag, ConflictFlag::Low);
        assert_eq!(merged.corroborating_sources.len(), 2);
    }

    #[test]
    fn test_boost_is_capped() {
        let items: Vec<_> = (0..10)
            .map(|i| item(&format!("e{i}"), CLAIM, &format!("https://s{i}.com/p"), "alpha", 0.9))
            .collect();
        let out = dedupe(items, true, &Lexicon::v1());
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_never_lowered() {
        let items = vec![
            item("e1", CLAIM, "https://a.com/x", "alpha", 0.99),
            item("e2", CLAIM, "https://b.com/x", "beta", 0.4),
        ];
        let out = dedupe(items, true, &Lexicon::v1());
        assert!((out[0].confidence - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent() {
        let items = vec![
            item("e1", CLAIM, "https://a.com/x", "alpha", 0.6),
            item("e2", CLAIM, "https://b.com/y", "beta", 0.5),
            item("e3", CLAIM, "https://c.com/z", "gamma", 0.55),
            item("e4", "Pricing is hidden until after the demo call", "", "alpha", 0.5),
        ];
        let lex = Lexicon::v1();
        let once = dedupe(items, true, &lex);
        let twice = dedupe(once.clone(), true, &lex);
        assert_eq!(once, twice);
        assert!((once[0].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_later_corroboration_adds_only_the_difference() {
        let lex = Lexicon::v1();
        let first = dedupe(
            vec![
                item("e1", CLAIM, "https://a.com/x", "alpha", 0.6),
                item("e2", CLAIM, "https://b.com/y", "beta", 0.5),
            ],
            true,
            &lex,
        );
        assert!((first[0].confidence - 0.65).abs() < 1e-9);

        let mut ledger = first;
        ledger.push(item("e3", CLAIM, "https://c.com/z", "gamma", 0.5));
        let second = dedupe(ledger, true, &lex);
        assert_eq!(second.len(), 1);
        assert!((second[0].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_stronger_same_source_item_inherits_corroboration() {
        let lex = Lexicon::v1();
        let mut ledger = dedupe(
            vec![
                item("e1", CLAIM, "https://a.com/x", "alpha", 0.6),
                item("e2", CLAIM, "https://b.com/y", "beta", 0.5),
            ],
            true,
            &lex,
        );
        ledger.push(item("e3", CLAIM, "https://a.com/x", "gamma", 0.7));
        let merged = dedupe(ledger, true, &lex);

        let fresh = dedupe(
            vec![
                item("e2", CLAIM, "https://b.com/y", "beta", 0.5),
                item("e3", CLAIM, "https://a.com/x", "gamma", 0.7),
            ],
            true,
            &lex,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].evidence_id, "e3");
        assert_eq!(merged[0].corroborating_sources.len(), 2);
        assert!((merged[0].confidence - 0.75).abs() < 1e-9);
        assert!((merged[0].confidence - fresh[0].confidence).abs() < 1e-9);
        assert_eq!(dedupe(merged.clone(), true, &lex), merged);
    }

    #[test]
    fn test_semantic_hash_ignores_order_and_stopwords() {
        let lex = Lexicon::v1();
        let a = item("e1", "slow export crashes", "", "a", 0.5);
        let b = item("e2", "The export crashes and is slow", "", "a", 0.5);
        assert_eq!(semantic_hash(&a, &lex), semantic_hash(&b, &lex));
    }
}
