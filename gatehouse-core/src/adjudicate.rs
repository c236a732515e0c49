//! Adjudicator seam and its deterministic fallback.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collector::ResearchContext;
use crate::error::AdjudicationError;
use crate::evidence::EvidenceItem;
use crate::lexicon::Lexicon;
use crate::pillars::{CrossPillarReport, PillarKind, ResearchPillars, build_cross_pillar_report};
use crate::trace::StageTrace;

/// What an adjudicator returns. Omitted pillars keep their input value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjudicationOutput {
    #[serde(default)]
    pub pillars: ResearchPillars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_pillar: Option<CrossPillarReport>,
}

/// Reconciles synthesized pillars into one coherent set.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    async fn adjudicate(
        &self,
        context: &ResearchContext,
        evidence: &[EvidenceItem],
        pillars: &ResearchPillars,
    ) -> Result<AdjudicationOutput, AdjudicationError>;
}

/// Pass the pillars through and recompute the consistency report.
pub fn fallback(pillars: &ResearchPillars, lexicon: &Lexicon) -> ResearchPillars {
    let mut out = pillars.clone();
    out.cross_pillar = Some(build_cross_pillar_report(pillars, lexicon));
    out
}

/// Run the adjudicator if one is configured, degrading to [`fallback`] on error.
pub async fn adjudicate(
    adjudicator: Option<&dyn Adjudicator>,
    context: &ResearchContext,
    evidence: &[EvidenceItem],
    pillars: &ResearchPillars,
    lexicon: &Lexicon,
    trace: &mut StageTrace,
) -> ResearchPillars {
    let Some(adjudicator) = adjudicator else {
        trace.record("adjudicate", "fallback", true, 0, "no adjudicator configured");
        return fallback(pillars, lexicon);
    };

    let started = Instant::now();
    let result = adjudicator.adjudicate(context, evidence, pillars).await;
    let elapsed = started.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            let mut merged = pillars.clone();
            let mut replaced = 0;
            for kind in PillarKind::ALL {
                if let Some(obj) = output.pillars.get(kind) {
                    merged.insert(obj);
                    replaced += 1;
                }
            }
            merged.cross_pillar = Some(
                output
                    .cross_pillar
                    .unwrap_or_else(|| build_cross_pillar_report(&merged, lexicon)),
            );
            info!(replaced, "Adjudication applied");
            trace.record("adjudicate", "all", true, elapsed, format!("{replaced} pillars adjudicated"));
            merged
        }
        Err(e) => {
            warn!(error = %e, "Adjudication failed; using pass-through fallback");
            trace.record("adjudicate", "fallback", false, elapsed, e.to_string());
            fallback(pillars, lexicon)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pillars::{MechanismAnalysis, VocBank};

    struct Rewriter;

    #[async_trait]
    impl Adjudicator for Rewriter {
        async fn adjudicate(
            &self,
            _context: &ResearchContext,
            _evidence: &[EvidenceItem],
            _pillars: &ResearchPillars,
        ) -> Result<AdjudicationOutput, AdjudicationError> {
            Ok(AdjudicationOutput {
                pillars: ResearchPillars {
                    mechanism: Some(MechanismAnalysis {
                        problem_mechanism: "adjudicated".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                cross_pillar: None,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Adjudicator for Broken {
        async fn adjudicate(
            &self,
            _context: &ResearchContext,
            _evidence: &[EvidenceItem],
            _pillars: &ResearchPillars,
        ) -> Result<AdjudicationOutput, AdjudicationError> {
            Err(AdjudicationError::Failed {
                message: "malformed response".into(),
            })
        }
    }

    fn input() -> ResearchPillars {
        ResearchPillars {
            voc_bank: Some(VocBank::default()),
            mechanism: Some(MechanismAnalysis::default()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_omitted_pillars_keep_input() {
        let mut trace = StageTrace::new();
        let out = adjudicate(
            Some(&Rewriter),
            &ResearchContext::new("Acme"),
            &[],
            &input(),
            &Lexicon::v1(),
            &mut trace,
        )
        .await;
        assert_eq!(out.voc_bank, Some(VocBank::default()));
        assert_eq!(
            out.mechanism.map(|m| m.problem_mechanism),
            Some("adjudicated".to_string())
        );
        assert!(out.cross_pillar.is_some());
        assert!(trace.entries()[0].ok);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_fallback() {
        let mut trace = StageTrace::new();
        let out = adjudicate(
            Some(&Broken),
            &ResearchContext::new("Acme"),
            &[],
            &input(),
            &Lexicon::v1(),
            &mut trace,
        )
        .await;
        let mut expected = input();
        expected.cross_pillar = out.cross_pillar.clone();
        assert_eq!(out, expected);
        assert_eq!(out.cross_pillar.map(|r| r.consistent), Some(false));
        assert!(!trace.entries()[0].ok);
        assert_eq!(trace.entries()[0].note, "Adjudication failed: malformed response");
    }

    #[tokio::test]
    async fn test_without_adjudicator() {
        let mut trace = StageTrace::new();
        let out = adjudicate(None, &ResearchContext::new("Acme"), &[], &input(), &Lexicon::v1(), &mut trace).await;
        assert!(out.cross_pillar.is_some());
        assert_eq!(trace.entries()[0].target, "fallback");
    }
}
