//! End-to-end pipeline scenarios with scripted collectors and synthesizers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use gatehouse_core::artifacts;
use gatehouse_core::error::{CollectorError, QualityGateError, SynthesisError};
use gatehouse_core::persistence::read_json;
use gatehouse_core::pillars::{
    AwarenessClassification, CompetitiveIntel, EmotionalDrivers, Lf8Category, MechanismAnalysis,
    ProofInventory, ProspectProfile, QuoteCategory, VocBank, VocQuote,
};
use gatehouse_core::{
    CheckpointStore, CollectionRequest, Collector, CollectorOutput, CollectorSpecialty,
    FileCheckpointStore, GateId, GatePolicy, GatehouseError, PillarKind, PillarObject,
    PillarSynthesizer, Pipeline, PipelineConfig, QualityGateReport, ResearchContext,
    RetryAuditEntry, RoundStatus, SourceType, SynthesisRequest,
};

const REVIEWS: &str = "\
Exports take forever once a workspace passes a few hundred projects https://www.g2.com/products/acme/reviews/?utm_source=newsletter
Exports take forever once a workspace passes a few hundred projects https://g2.com/products/acme/reviews
\"We switched because the old tool kept losing our client notes\" https://www.reddit.com/r/agency/comments/xyz
";

/// Returns a fixed report and counts calls.
struct ScriptedCollector {
    name: &'static str,
    specialty: CollectorSpecialty,
    report: &'static str,
    fail_initial: bool,
    calls: AtomicUsize,
}

impl ScriptedCollector {
    fn new(name: &'static str, report: &'static str) -> Self {
        Self {
            name,
            specialty: CollectorSpecialty::General,
            report,
            fail_initial: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            fail_initial: true,
            ..Self::new(name, "")
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn name(&self) -> &str {
        self.name
    }

    fn specialty(&self) -> CollectorSpecialty {
        self.specialty
    }

    async fn collect(&self, _request: &CollectionRequest) -> CollectorOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initial {
            return CollectorOutput::failed(self.name, "provider unavailable");
        }
        CollectorOutput {
            success: true,
            provider: self.name.to_string(),
            report_text: self.report.to_string(),
            ..Default::default()
        }
    }
}

/// Returns an empty body for every pillar except the VOC bank, which is fixed.
#[derive(Default)]
struct FixtureSynthesizer {
    voc: VocBank,
}

#[async_trait]
impl PillarSynthesizer for FixtureSynthesizer {
    async fn synthesize(
        &self,
        pillar: PillarKind,
        _request: SynthesisRequest<'_>,
    ) -> Result<PillarObject, SynthesisError> {
        Ok(match pillar {
            PillarKind::ProspectProfile => PillarObject::ProspectProfile(ProspectProfile::default()),
            PillarKind::VocBank => PillarObject::VocBank(self.voc.clone()),
            PillarKind::CompetitiveIntel => PillarObject::CompetitiveIntel(CompetitiveIntel::default()),
            PillarKind::Mechanism => PillarObject::Mechanism(MechanismAnalysis::default()),
            PillarKind::Awareness => PillarObject::Awareness(AwarenessClassification::default()),
            PillarKind::EmotionalDrivers => PillarObject::EmotionalDrivers(EmotionalDrivers::default()),
            PillarKind::ProofInventory => PillarObject::ProofInventory(ProofInventory::default()),
        })
    }
}

fn quote(id: &str, text: &str, segment: &str, url: &str, source_type: SourceType) -> VocQuote {
    VocQuote {
        quote_id: id.into(),
        text: text.into(),
        category: QuoteCategory::Pain,
        segment: segment.into(),
        emotion: None,
        theme: None,
        source_url: url.into(),
        source_type,
        evidence_id: None,
        provider: "alpha".into(),
    }
}

fn config(max_rounds: usize, policy: GatePolicy) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.max_rounds = max_rounds;
    config.retry.policy = policy;
    config
}

fn pipeline(config: PipelineConfig, synthesizer: FixtureSynthesizer) -> Pipeline {
    Pipeline::new(config, Arc::new(synthesizer)).unwrap()
}

fn context() -> ResearchContext {
    let mut context = ResearchContext::new("Acme Reports");
    context.market = "Agencies in the US".into();
    context
}

#[tokio::test]
async fn test_tracking_params_and_trailing_slash_collapse_to_one_item() {
    let outcome = pipeline(config(0, GatePolicy::Soft), FixtureSynthesizer::default())
        .with_collector(Arc::new(ScriptedCollector::new("alpha", REVIEWS)))
        .run(&context())
        .await
        .unwrap();

    let exports: Vec<_> = outcome
        .evidence
        .iter()
        .filter(|e| e.claim.starts_with("Exports take forever"))
        .collect();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].source_url, "https://g2.com/products/acme/reviews");
    assert_eq!(exports[0].source_type, SourceType::Review);
    assert_eq!(outcome.evidence_summary.total, outcome.evidence.len());
}

#[tokio::test]
async fn test_invalid_quotes_never_reach_the_final_bank() {
    let synthesizer = FixtureSynthesizer {
        voc: VocBank {
            quotes: vec![
                quote(
                    "q_valid",
                    "Exporting a big workspace takes the whole afternoon",
                    "Agencies",
                    "https://g2.com/products/acme/reviews",
                    SourceType::Review,
                ),
                quote("q_unsourced", "Nobody can find the export button", "Agencies", "", SourceType::Review),
                quote(
                    "q_other",
                    "The export is fine I guess",
                    "Agencies",
                    "https://example.com/page",
                    SourceType::Other,
                ),
            ],
        },
    };
    let outcome = pipeline(config(0, GatePolicy::Soft), synthesizer)
        .with_collector(Arc::new(ScriptedCollector::new("alpha", REVIEWS)))
        .run(&context())
        .await
        .unwrap();

    let bank = outcome.pillars.voc_bank.unwrap();
    let ids: Vec<&str> = bank.quotes.iter().map(|q| q.quote_id.as_str()).collect();
    assert!(ids.contains(&"q_valid"));
    assert!(!ids.contains(&"q_unsourced"));
    assert!(!ids.contains(&"q_other"));
    assert!(bank.quotes.iter().all(|q| q.is_valid()));
    assert!(outcome.hardening_log.for_action("remove_invalid_quotes").count() >= 1);
}

#[tokio::test]
async fn test_unresolved_gates_soft_policy_returns_annotated_result() {
    let dir = TempDir::new().unwrap();
    let mut config = config(1, GatePolicy::Soft);
    config.artifacts.output_dir = Some(dir.path().to_path_buf());

    let collector = Arc::new(ScriptedCollector::new("alpha", REVIEWS));
    let outcome = pipeline(config, FixtureSynthesizer::default())
        .with_collector(collector.clone())
        .run(&context())
        .await
        .unwrap();

    assert!(!outcome.gate_report.overall_pass);
    assert_eq!(outcome.gate_report.retry_rounds_used, 1);
    // Initial collection plus exactly one targeted recollection.
    assert_eq!(collector.calls(), 2);
    assert!(outcome.warning.is_some());

    let run_dir = dir.path().join(outcome.run_id.to_string());
    let audit: Vec<RetryAuditEntry> = read_json(&run_dir.join(artifacts::RETRY_AUDIT))
        .unwrap()
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].collector.as_deref(), Some("alpha"));
    assert_ne!(audit[0].status, RoundStatus::CollectorFailed);

    let report: QualityGateReport = read_json(&run_dir.join(artifacts::QUALITY_GATE_REPORT))
        .unwrap()
        .unwrap();
    assert_eq!(report.checks.len(), GateId::ALL.len());
    assert_eq!(report.warning, outcome.warning);
}

#[tokio::test]
async fn test_unresolved_gates_strict_policy_blocks() {
    let err = pipeline(config(1, GatePolicy::Strict), FixtureSynthesizer::default())
        .with_collector(Arc::new(ScriptedCollector::new("alpha", REVIEWS)))
        .run(&context())
        .await
        .unwrap_err();

    match err {
        GatehouseError::QualityGate(QualityGateError::Blocked {
            failed_gate_ids,
            rounds,
        }) => {
            assert_eq!(rounds, 1);
            assert!(failed_gate_ids.contains(&GateId::GlobalEvidenceCoverage));
        }
        other => panic!("expected a quality gate block, got {other}"),
    }
}

#[tokio::test]
async fn test_lf8_rows_need_two_quotes_from_two_domains() {
    const DRIVERS: &str = "Pillar 6\n- Fear of wasting money\n";
    let both = FixtureSynthesizer {
        voc: VocBank {
            quotes: vec![
                quote("q1", "Afraid of wasting money again", "Agencies", "https://g2.com/a", SourceType::Review),
                quote(
                    "q2",
                    "Wasting money on tools scares me",
                    "Agencies",
                    "https://reddit.com/r/x/1",
                    SourceType::Reddit,
                ),
            ],
        },
    };
    let outcome = pipeline(config(0, GatePolicy::Soft), both)
        .with_collector(Arc::new(ScriptedCollector::new("alpha", DRIVERS)))
        .run(&context())
        .await
        .unwrap();
    let drivers = outcome.pillars.emotional_drivers.unwrap();
    assert_eq!(drivers.lf8.len(), 1);
    assert_eq!(drivers.lf8[0].category, Lf8Category::FreedomFromFear);
    assert_eq!(drivers.lf8[0].segment, "Agencies");

    const SINGLE: &str = "Pillar 6\n- Family safety worries: parents fear for their kids\n";
    let single = FixtureSynthesizer {
        voc: VocBank {
            quotes: vec![quote(
                "q1",
                "As parents we worry about family safety every day",
                "Parents",
                "https://reddit.com/r/parenting/1",
                SourceType::Reddit,
            )],
        },
    };
    let outcome = pipeline(config(0, GatePolicy::Soft), single)
        .with_collector(Arc::new(ScriptedCollector::new("alpha", SINGLE)))
        .run(&context())
        .await
        .unwrap();
    let drivers = outcome.pillars.emotional_drivers.unwrap();
    assert!(drivers.lf8.iter().all(|row| row.segment != "Parents"));
}

#[tokio::test]
async fn test_all_collectors_failing_is_fatal_and_inspectable() {
    let dir = TempDir::new().unwrap();
    let mut config = config(2, GatePolicy::Soft);
    config.artifacts.output_dir = Some(dir.path().to_path_buf());

    let err = pipeline(config, FixtureSynthesizer::default())
        .with_collector(Arc::new(ScriptedCollector::failing("alpha")))
        .with_collector(Arc::new(ScriptedCollector::failing("beta")))
        .run(&context())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatehouseError::Collector(CollectorError::AllFailed { attempted: 2 })
    ));

    let runs: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(runs.len(), 1);
    let run_dir = runs.into_iter().next().unwrap().unwrap().path();
    let ledger: Vec<serde_json::Value> = read_json(&run_dir.join(artifacts::EVIDENCE_LEDGER))
        .unwrap()
        .unwrap();
    assert!(ledger.is_empty());
    let report: QualityGateReport = read_json(&run_dir.join(artifacts::QUALITY_GATE_REPORT))
        .unwrap()
        .unwrap();
    assert!(!report.overall_pass);
    assert!(report.checks.iter().all(|c| c.actual == "not evaluated"));
}

#[tokio::test]
async fn test_one_failing_collector_does_not_abort_the_run() {
    let outcome = pipeline(config(0, GatePolicy::Soft), FixtureSynthesizer::default())
        .with_collector(Arc::new(ScriptedCollector::failing("alpha")))
        .with_collector(Arc::new(ScriptedCollector::new("beta", REVIEWS)))
        .run(&context())
        .await
        .unwrap();
    assert!(!outcome.evidence.is_empty());
    assert!(outcome.evidence.iter().all(|e| e.provider == "beta"));
    let collect: Vec<_> = outcome.stage_trace.for_stage("collect").collect();
    assert_eq!(collect.len(), 2);
    assert!(!collect[0].ok);
    assert!(collect[1].ok);
}

#[tokio::test]
async fn test_checkpoint_reuse_skips_collection_on_unchanged_input() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path().join("checkpoints")));
    let collector = Arc::new(ScriptedCollector::new("alpha", REVIEWS));

    let run = |ctx: ResearchContext| {
        let pipeline = pipeline(config(0, GatePolicy::Soft), FixtureSynthesizer::default())
            .with_collector(Arc::clone(&collector) as Arc<dyn Collector>)
            .with_checkpoint_store(Arc::clone(&store) as Arc<dyn CheckpointStore>);
        async move { pipeline.run(&ctx).await.unwrap() }
    };

    let first = run(context()).await;
    assert_eq!(collector.calls(), 1);
    let second = run(context()).await;
    assert_eq!(collector.calls(), 1);
    assert_eq!(first.evidence, second.evidence);

    let mut changed = context();
    changed.target_audience = "Freelance designers".into();
    run(changed).await;
    assert_eq!(collector.calls(), 2);
}
