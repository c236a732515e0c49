//! Cross-pillar consistency report.

use std::collections::BTreeSet;

use super::model::{CrossPillarReport, QuoteCategory};
use super::ResearchPillars;
use crate::lexicon::Lexicon;
use crate::text;

/// Positioning overlap above which a solution mechanism is a competitor's claim.
const POSITIONING_COLLISION: f64 = 0.6;

/// Check objections against quotes, the mechanism against the competitive map,
/// and emotion drivers against quote ids.
pub fn build_cross_pillar_report(pillars: &ResearchPillars, lexicon: &Lexicon) -> CrossPillarReport {
    let (objections_traceable, unmatched_objections) = trace_objections(pillars, lexicon);
    let (mechanism_aligned, mechanism_notes) = align_mechanism(pillars, lexicon);
    let (emotions_traceable, untraceable_emotions) = trace_emotions(pillars);

    CrossPillarReport {
        consistent: objections_traceable && mechanism_aligned && emotions_traceable,
        objections_traceable,
        unmatched_objections,
        mechanism_aligned,
        mechanism_notes,
        emotions_traceable,
        untraceable_emotions,
    }
}

fn trace_objections(pillars: &ResearchPillars, lexicon: &Lexicon) -> (bool, Vec<String>) {
    let Some(profile) = &pillars.prospect_profile else {
        return (false, Vec::new());
    };
    let quote_tokens: Vec<BTreeSet<String>> = pillars
        .voc_bank
        .iter()
        .flat_map(|bank| bank.valid_quotes())
        .filter(|q| q.category == QuoteCategory::Objection)
        .map(|q| text::tokens(&q.text, lexicon))
        .collect();

    let unmatched: Vec<String> = profile
        .segments
        .iter()
        .flat_map(|s| s.objections.iter())
        .filter(|objection| {
            let toks = text::tokens(objection, lexicon);
            !quote_tokens.iter().any(|q| text::overlap(&toks, q) >= 1)
        })
        .cloned()
        .collect();
    (unmatched.is_empty(), unmatched)
}

fn align_mechanism(pillars: &ResearchPillars, lexicon: &Lexicon) -> (bool, Vec<String>) {
    let mut notes = Vec::new();
    let Some(mechanism) = &pillars.mechanism else {
        notes.push("mechanism missing".to_string());
        return (false, notes);
    };
    if !mechanism.is_two_part() {
        notes.push("mechanism lacks a problem or solution part".to_string());
    }
    let Some(intel) = &pillars.competitive_intel else {
        notes.push("competitive map missing".to_string());
        return (false, notes);
    };

    let solution = text::tokens(&mechanism.solution_mechanism, lexicon);
    for competitor in &intel.competitors {
        let positioning = text::tokens(&competitor.positioning, lexicon);
        if !positioning.is_empty() && text::jaccard(&solution, &positioning) >= POSITIONING_COLLISION {
            notes.push(format!(
                "solution mechanism restates {}'s positioning",
                competitor.name
            ));
        }
    }
    (notes.is_empty(), notes)
}

fn trace_emotions(pillars: &ResearchPillars) -> (bool, Vec<String>) {
    let Some(drivers) = &pillars.emotional_drivers else {
        return (false, Vec::new());
    };
    let known = pillars
        .voc_bank
        .as_ref()
        .map(|b| b.quote_ids())
        .unwrap_or_default();
    let untraceable: Vec<String> = drivers
        .drivers
        .iter()
        .filter(|d| !d.quote_ids.iter().any(|id| known.contains(id.as_str())))
        .map(|d| d.label.clone())
        .collect();
    (untraceable.is_empty(), untraceable)
}
