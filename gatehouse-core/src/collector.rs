//! Collector seam: research context, collection requests and outputs.
//!
//! Collectors are opaque. The engine only consumes
//! `(success, report_text, evidence_rows, trace)` from them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::evidence::EvidenceRow;
use crate::gates::GateId;
use crate::pillars::PillarKind;

/// What is being researched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub product_name: String,
    #[serde(default)]
    pub product_description: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub competitors_hint: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ResearchContext {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            ..Default::default()
        }
    }
}

/// The kind of research a collector is best at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorSpecialty {
    #[default]
    General,
    Voc,
    Competitive,
    Proof,
}

/// Narrowing for a targeted recollection round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecollectionFocus {
    pub round: usize,
    pub failing_gates: Vec<GateId>,
    pub allowed_segments: Vec<String>,
    pub evidence_sample: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub context: ResearchContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<RecollectionFocus>,
}

impl CollectionRequest {
    pub fn initial(context: ResearchContext) -> Self {
        Self {
            context,
            focus: None,
        }
    }
}

/// What a collector returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorOutput {
    pub success: bool,
    pub provider: String,
    #[serde(default)]
    pub report_text: String,
    #[serde(default)]
    pub evidence_rows: Vec<EvidenceRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub trace: Vec<String>,
}

impl CollectorOutput {
    pub fn failed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider: provider.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Free-text part of a successful output.
    pub fn report(&self) -> Option<CollectorReport> {
        (self.success && !self.report_text.trim().is_empty()).then(|| CollectorReport {
            provider: self.provider.clone(),
            report_text: self.report_text.clone(),
        })
    }
}

/// A provider's free-text report, as handed to synthesizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorReport {
    pub provider: String,
    pub report_text: String,
}

/// A research provider.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable provider name.
    fn name(&self) -> &str;

    fn specialty(&self) -> CollectorSpecialty {
        CollectorSpecialty::General
    }

    /// Tags applied to evidence that matches no keyword bucket.
    fn default_tags(&self) -> Vec<PillarKind> {
        Vec::new()
    }

    /// Collect research. Failures are reported in the output, not raised.
    async fn collect(&self, request: &CollectionRequest) -> CollectorOutput;
}

/// Run every collector concurrently and join.
///
/// Outputs are returned in collector order. A failed collector contributes a
/// failed output and never aborts the others.
pub async fn collect_all(
    collectors: &[Arc<dyn Collector>],
    request: &CollectionRequest,
) -> Vec<(CollectorOutput, u64)> {
    let futures = collectors.iter().map(|collector| {
        let collector = Arc::clone(collector);
        async move {
            let started = Instant::now();
            let mut output = collector.collect(request).await;
            if output.provider.is_empty() {
                output.provider = collector.name().to_string();
            }
            (output, started.elapsed().as_millis() as u64)
        }
    });
    let results = join_all(futures).await;

    let succeeded = results.iter().filter(|(o, _)| o.success).count();
    for (output, _) in results.iter().filter(|(o, _)| !o.success) {
        warn!(
            provider = %output.provider,
            error = output.error.as_deref().unwrap_or("unknown"),
            "Collector failed"
        );
    }
    info!(
        attempted = collectors.len(),
        succeeded,
        "Collection complete"
    );
    results
}

/// Pick the single collector to address `failing` gates in a retry round.
///
/// Contradiction failures prefer a general collector; VOC and emotion
/// failures prefer a VOC collector; otherwise the preference order applies,
/// then registration order.
pub fn select_recollector(
    collectors: &[Arc<dyn Collector>],
    failing: &[GateId],
    preference: &[String],
) -> Option<Arc<dyn Collector>> {
    let by_specialty = |specialty: CollectorSpecialty| {
        collectors
            .iter()
            .find(|c| c.specialty() == specialty)
            .cloned()
    };

    if failing.contains(&GateId::ContradictionAudit) {
        if let Some(c) = by_specialty(CollectorSpecialty::General) {
            return Some(c);
        }
    }
    if failing.iter().any(|g| g.is_voc_related()) {
        if let Some(c) = by_specialty(CollectorSpecialty::Voc) {
            return Some(c);
        }
    }
    for name in preference {
        if let Some(c) = collectors.iter().find(|c| c.name() == name) {
            return Some(Arc::clone(c));
        }
    }
    collectors.first().cloned()
}


#[cfg(test)]
mod tests {
    use super::test_support::StaticCollector;
    use super::*;

    fn registry() -> Vec<Arc<dyn Collector>> {
        vec![
            Arc::new(StaticCollector::ok("scout", CollectorSpecialty::Competitive, "r")),
            Arc::new(StaticCollector::ok("listener", CollectorSpecialty::Voc, "r")),
            Arc::new(StaticCollector::ok("generalist", CollectorSpecialty::General, "r")),
        ]
    }

    #[tokio::test]
    async fn test_collect_all_isolates_failures() {
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(StaticCollector::ok("a", CollectorSpecialty::General, "report a")),
            Arc::new(StaticCollector::failing("b")),
        ];
        let request = CollectionRequest::initial(ResearchContext::new("Acme"));
        let outputs = collect_all(&collectors, &request).await;
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].0.success);
        assert!(!outputs[1].0.success);
        assert_eq!(outputs[1].0.error.as_deref(), Some("upstream timeout"));
    }

    #[test]
    fn test_select_general_for_contradictions() {
        let picked = select_recollector(
            &registry(),
            &[GateId::ContradictionAudit, GateId::Pillar2VocDepth],
            &[],
        );
        assert_eq!(picked.map(|c| c.name().to_string()).as_deref(), Some("generalist"));
    }

    #[test]
    fn test_select_voc_for_voc_gates() {
        let picked = select_recollector(&registry(), &[GateId::Pillar6EmotionDominance], &[]);
        assert_eq!(picked.map(|c| c.name().to_string()).as_deref(), Some("listener"));
    }

    #[test]
    fn test_select_by_preference_then_registration() {
        let failing = [GateId::Pillar3CompetitiveDepth];
        let picked = select_recollector(&registry(), &failing, &["generalist".into()]);
        assert_eq!(picked.map(|c| c.name().to_string()).as_deref(), Some("generalist"));

        let picked = select_recollector(&registry(), &failing, &["missing".into()]);
        assert_eq!(picked.map(|c| c.name().to_string()).as_deref(), Some("scout"));
    }

    #[test]
    fn test_report_only_for_successful_text() {
        let failed = CollectorOutput::failed("x", "boom");
        assert!(failed.report().is_none());
        let ok = CollectorOutput {
            success: true,
            provider: "x".into(),
            report_text: "findings".into(),
            ..Default::default()
        };
        assert_eq!(ok.report().map(|r| r.provider), Some("x".to_string()));
    }
}
