//! Dependency-ordered pillar synthesis.
//!
//! First-wave pillars (1, 2, 3, 4, 7) run concurrently against an empty
//! dependency map. Pillar 6 is derived deterministically when a VOC bank
//! exists, and pillar 5 runs last with pillars 1 through 4 as dependencies.
//! A failed synthesis keeps whatever value the pillar had before.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use super::emotion::EmotionClusterer;
use super::{PillarKind, PillarObject, ResearchPillars};
use crate::collector::{CollectorReport, ResearchContext};
use crate::error::SynthesisError;
use crate::evidence::EvidenceItem;
use crate::trace::StageTrace;

/// Inputs for one synthesizer call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub context: &'a ResearchContext,
    pub evidence: &'a [EvidenceItem],
    pub collector_reports: &'a [CollectorReport],
    pub dependencies: &'a BTreeMap<PillarKind, PillarObject>,
}

/// External pillar synthesizer.
#[async_trait]
pub trait PillarSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        pillar: PillarKind,
        request: SynthesisRequest<'_>,
    ) -> Result<PillarObject, SynthesisError>;
}

/// Runs the pillar DAG for a set of targets.
pub struct SynthesisScheduler {
    synthesizer: Arc<dyn PillarSynthesizer>,
    clusterer: EmotionClusterer,
}

impl SynthesisScheduler {
    pub fn new(synthesizer: Arc<dyn PillarSynthesizer>, clusterer: EmotionClusterer) -> Self {
        Self {
            synthesizer,
            clusterer,
        }
    }

    /// Synthesize `targets` into `pillars`. Returns the pillars that were updated.
    pub async fn run(
        &self,
        targets: &BTreeSet<PillarKind>,
        context: &ResearchContext,
        evidence: &[EvidenceItem],
        reports: &[CollectorReport],
        pillars: &mut ResearchPillars,
        trace: &mut StageTrace,
    ) -> BTreeSet<PillarKind> {
        let mut updated = BTreeSet::new();

        let first_wave: Vec<PillarKind> = targets
            .iter()
            .copied()
            .filter(|k| k.is_first_wave())
            .collect();
        if !first_wave.is_empty() {
            let empty = BTreeMap::new();
            let request = SynthesisRequest {
                context,
                evidence,
                collector_reports: reports,
                dependencies: &empty,
            };
            let futures = first_wave.iter().map(|&kind| {
                let synthesizer = Arc::clone(&self.synthesizer);
                async move {
                    let started = Instant::now();
                    let result = synthesizer.synthesize(kind, request).await;
                    (kind, result, started.elapsed().as_millis() as u64)
                }
            });
            for (kind, result, elapsed) in join_all(futures).await {
                if apply(kind, result, elapsed, pillars, trace) {
                    updated.insert(kind);
                }
            }
        }

        if targets.contains(&PillarKind::EmotionalDrivers) {
            let kind = PillarKind::EmotionalDrivers;
            match &pillars.voc_bank {
                Some(voc) => {
                    let started = Instant::now();
                    let drivers = self.clusterer.derive(reports, voc, evidence);
                    trace.record(
                        "synthesize",
                        kind.id(),
                        true,
                        started.elapsed().as_millis() as u64,
                        format!("derived {} drivers ({:?})", drivers.drivers.len(), drivers.source),
                    );
                    pillars.insert(PillarObject::EmotionalDrivers(drivers));
                    updated.insert(kind);
                }
                None => {
                    if self.synthesize_dependent(kind, context, evidence, reports, pillars, trace).await {
                        updated.insert(kind);
                    }
                }
            }
        }

        if targets.contains(&PillarKind::Awareness)
            && self
                .synthesize_dependent(PillarKind::Awareness, context, evidence, reports, pillars, trace)
                .await
        {
            updated.insert(PillarKind::Awareness);
        }

        info!(
            targets = targets.len(),
            updated = updated.len(),
            "Pillar synthesis complete"
        );
        updated
    }

    async fn synthesize_dependent(
        &self,
        kind: PillarKind,
        context: &ResearchContext,
        evidence: &[EvidenceItem],
        reports: &[CollectorReport],
        pillars: &mut ResearchPillars,
        trace: &mut StageTrace,
    ) -> bool {
        let dependencies = pillars.dependencies_for(kind);
        let request = SynthesisRequest {
            context,
            evidence,
            collector_reports: reports,
            dependencies: &dependencies,
        };
        let started = Instant::now();
        let result = self.synthesizer.synthesize(kind, request).await;
        apply(kind, result, started.elapsed().as_millis() as u64, pillars, trace)
    }
}

fn apply(
    kind: PillarKind,
    result: Result<PillarObject, SynthesisError>,
    elapsed_ms: u64,
    pillars: &mut ResearchPillars,
    trace: &mut StageTrace,
) -> bool {
    let checked = result.and_then(|obj| {
        if obj.kind() == kind {
            Ok(obj)
        } else {
            Err(SynthesisError::WrongKind {
                expected: kind,
                got: obj.kind(),
            })
        }
    });
    match checked {
        Ok(obj) => {
            pillars.insert(obj);
            trace.record("synthesize", kind.id(), true, elapsed_ms, "");
            true
        }
        Err(e) => {
            warn!(pillar = %kind, error = %e, "Synthesis failed; keeping previous value");
            trace.record("synthesize", kind.id(), false, elapsed_ms, e.to_string());
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;
    use crate::pillars::model::*;

    /// Returns a default body of the requested kind and records each call.
    #[derive(Default)]
    pub struct RecordingSynthesizer {
        pub calls: Mutex<Vec<(PillarKind, Vec<PillarKind>)>>,
        pub fail: BTreeSet<PillarKind>,
    }

    pub fn empty_pillar(kind: PillarKind) -> PillarObject {
        match kind {
            PillarKind::ProspectProfile => PillarObject::ProspectProfile(ProspectProfile::default()),
            PillarKind::VocBank => PillarObject::VocBank(VocBank::default()),
            PillarKind::CompetitiveIntel => PillarObject::CompetitiveIntel(CompetitiveIntel::default()),
            PillarKind::Mechanism => PillarObject::Mechanism(MechanismAnalysis::default()),
            PillarKind::Awareness => PillarObject::Awareness(AwarenessClassification::default()),
            PillarKind::EmotionalDrivers => PillarObject::EmotionalDrivers(EmotionalDrivers::default()),
            PillarKind::ProofInventory => PillarObject::ProofInventory(ProofInventory::default()),
        }
    }

    #[async_trait]
    impl PillarSynthesizer for RecordingSynthesizer {
        async fn synthesize(
            &self,
            pillar: PillarKind,
            request: SynthesisRequest<'_>,
        ) -> Result<PillarObject, SynthesisError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((pillar, request.dependencies.keys().copied().collect()));
            }
            if self.fail.contains(&pillar) {
                return Err(SynthesisError::Failed {
                    pillar,
                    message: "model refused".into(),
                });
            }
            Ok(empty_pillar(pillar))
        }
    }
}
