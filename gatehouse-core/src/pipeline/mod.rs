//! Run orchestration: collect, normalize, audit, synthesize, harden, gate,
//! and retry with targeted recollection until the gates pass or the round
//! or time budget runs out.

pub mod round;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adjudicate::{self, Adjudicator};
use crate::artifacts::ArtifactWriter;
use crate::checkpoint::{CheckpointBundle, CheckpointStore, checkpoint_key};
use crate::collector::{
    CollectionRequest, Collector, CollectorOutput, CollectorReport, ResearchContext, collect_all,
    select_recollector,
};
use crate::config::{GatePolicy, PipelineConfig};
use crate::contradiction::{
    self, ContradictionDetector, ContradictionRefiner, ContradictionReport, high_unresolved_count,
    propagate_flags,
};
use crate::error::{
    CollectorError, ConfigError, ContradictionError, GatehouseError, QualityGateError, Result,
};
use crate::evidence::{ConflictFlag, EvidenceItem, EvidenceNormalizer, EvidenceSummary, dedupe};
use crate::gates::{GateId, QualityGateEngine, QualityGateReport, pillars_for_gates};
use crate::hardening::{Hardener, HardeningLog};
use crate::lexicon::Lexicon;
use crate::pillars::{
    EmotionClusterer, PillarKind, PillarSynthesizer, ResearchPillars, SynthesisScheduler,
};
use crate::trace::StageTrace;

pub use round::{
    RetryAuditEntry, RoundResult, RoundStatus, build_focus, build_recollection_prompt,
};

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub evidence: Vec<EvidenceItem>,
    pub contradictions: Vec<ContradictionReport>,
    pub pillars: ResearchPillars,
    pub gate_report: QualityGateReport,
    pub retry_audit: Vec<RetryAuditEntry>,
    pub stage_trace: StageTrace,
    pub hardening_log: HardeningLog,
    pub evidence_summary: EvidenceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Mutable run state handed from one round to the next.
#[derive(Debug, Default)]
struct RunState {
    evidence: Vec<EvidenceItem>,
    contradictions: Vec<ContradictionReport>,
    reports: Vec<CollectorReport>,
    pillars: ResearchPillars,
    hardening_log: HardeningLog,
    trace: StageTrace,
}

/// The evidence and quality-gate pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    lexicon: Lexicon,
    collectors: Vec<Arc<dyn Collector>>,
    synthesizer: Arc<dyn PillarSynthesizer>,
    adjudicator: Option<Arc<dyn Adjudicator>>,
    refiner: Option<Arc<dyn ContradictionRefiner>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl Pipeline {
    /// Create a pipeline. Fails when the configuration does not validate or
    /// names an unknown lexicon version.
    pub fn new(config: PipelineConfig, synthesizer: Arc<dyn PillarSynthesizer>) -> Result<Self> {
        config.validate()?;
        let lexicon =
            Lexicon::for_version(&config.lexicon_version).ok_or_else(|| ConfigError::Invalid {
                message: format!("unknown lexicon version '{}'", config.lexicon_version),
            })?;
        Ok(Self {
            config,
            lexicon,
            collectors: Vec::new(),
            synthesizer,
            adjudicator: None,
            refiner: None,
            checkpoints: None,
        })
    }

    /// Register a collector. Registration order breaks retry-selection ties.
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_adjudicator(mut self, adjudicator: Arc<dyn Adjudicator>) -> Self {
        self.adjudicator = Some(adjudicator);
        self
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn ContradictionRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Replace the keyword tables, e.g. with a test fixture.
    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registered collectors that the configuration enables, in registration order.
    pub fn enabled_collectors(&self) -> Vec<Arc<dyn Collector>> {
        let registered: Vec<&str> = self.collectors.iter().map(|c| c.name()).collect();
        let enabled = self.config.enabled(&registered);
        self.collectors
            .iter()
            .filter(|c| enabled.contains(&c.name()))
            .cloned()
            .collect()
    }

    /// Execute one full run for `context`.
    pub async fn run(&self, context: &ResearchContext) -> Result<PipelineOutcome> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let writer = self.artifact_writer(run_id);
        info!(%run_id, product = %context.product_name, "Pipeline run started");

        let collectors = self.enabled_collectors();
        if collectors.is_empty() {
            return Err(self.fail(writer.as_ref(), &[], CollectorError::NoneEnabled));
        }

        let mut state = RunState::default();
        let outputs = self.initial_collection(context, &collectors, &mut state.trace).await;
        if !outputs.iter().any(|o| o.success) {
            let err = CollectorError::AllFailed {
                attempted: collectors.len(),
            };
            return Err(self.fail(writer.as_ref(), &[], err));
        }

        state.reports = outputs.iter().filter_map(CollectorOutput::report).collect();
        state.evidence = self.ingest(Vec::new(), &outputs, &collectors);
        self.audit_contradictions(&mut state).await;

        if self.config.contradiction.block_on_high_unresolved {
            let count = high_unresolved_count(&state.contradictions);
            if count > 0 {
                let err = ContradictionError::Blocked { count };
                return Err(self.fail(writer.as_ref(), &state.evidence, err));
            }
        }

        let all: BTreeSet<PillarKind> = PillarKind::ALL.into_iter().collect();
        self.scheduler()
            .run(
                &all,
                context,
                &state.evidence,
                &state.reports,
                &mut state.pillars,
                &mut state.trace,
            )
            .await;
        let mut report = self.finish_pass(context, &mut state).await;

        let budget = Duration::from_secs(self.config.retry.time_budget_secs);
        let mut retry_audit: Vec<RetryAuditEntry> = Vec::new();
        let mut budget_exceeded = false;
        while !report.overall_pass && retry_audit.len() < self.config.retry.max_rounds {
            if clock.elapsed() >= budget {
                warn!(
                    elapsed_secs = clock.elapsed().as_secs(),
                    budget_secs = budget.as_secs(),
                    "Time budget exhausted; stopping retries"
                );
                budget_exceeded = true;
                break;
            }
            let round = retry_audit.len() + 1;
            let (next, result) = self.run_round(round, context, &collectors, state, &report).await;
            state = next;
            retry_audit.push(result.audit);
            report = result.report;
        }
        report.retry_rounds_used = retry_audit.len();

        let mut warning = None;
        if !report.overall_pass {
            let reason = if budget_exceeded {
                "time budget exhausted"
            } else {
                "retry rounds exhausted"
            };
            let message = format!(
                "Quality gates failing after {} retry rounds ({reason}): {}",
                retry_audit.len(),
                join_ids(&report.failed_gate_ids)
            );
            match self.config.retry.policy {
                GatePolicy::Strict => {
                    report.warning = Some(message.clone());
                }
                GatePolicy::Soft => {
                    warn!(failed = ?report.failed_gate_ids, "{message}");
                    report.warning = Some(message.clone());
                    warning = Some(message);
                }
            }
        }

        let outcome = PipelineOutcome {
            run_id,
            started_at,
            evidence_summary: EvidenceSummary::from_items(&state.evidence),
            evidence: state.evidence,
            contradictions: state.contradictions,
            pillars: state.pillars,
            gate_report: report,
            retry_audit,
            stage_trace: state.trace,
            hardening_log: state.hardening_log,
            warning,
        };

        if !outcome.gate_report.overall_pass && self.config.retry.policy == GatePolicy::Strict {
            if let Some(writer) = &writer {
                if let Err(e) = writer.write_outcome(&outcome) {
                    warn!(error = %e, "Failed to persist artifacts for blocked run");
                }
            }
            return Err(QualityGateError::Blocked {
                failed_gate_ids: outcome.gate_report.failed_gate_ids.clone(),
                rounds: outcome.gate_report.retry_rounds_used,
            }
            .into());
        }

        if let Some(writer) = &writer {
            writer.write_outcome(&outcome)?;
        }
        info!(
            %run_id,
            evidence = outcome.evidence.len(),
            passed = outcome.gate_report.overall_pass,
            rounds = outcome.gate_report.retry_rounds_used,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        Ok(outcome)
    }

    /// One targeted recollection round. Consumes the state and hands it back
    /// with the round's result.
    async fn run_round(
        &self,
        round: usize,
        context: &ResearchContext,
        collectors: &[Arc<dyn Collector>],
        mut state: RunState,
        report: &QualityGateReport,
    ) -> (RunState, RoundResult) {
        let started = Instant::now();
        let failing_before = report.failed_gate_ids.clone();
        let collector_failed = |collector: Option<String>, elapsed: u64| RoundResult {
            audit: RetryAuditEntry {
                round,
                failing_before: failing_before.clone(),
                collector,
                evidence_added: 0,
                failing_after: failing_before.clone(),
                resynthesized: Vec::new(),
                status: RoundStatus::CollectorFailed,
                duration_ms: elapsed,
            },
            report: report.clone(),
        };

        let Some(collector) = select_recollector(
            collectors,
            &failing_before,
            &self.config.collection.collector_preference,
        ) else {
            return (state, collector_failed(None, 0));
        };
        let name = collector.name().to_string();

        let focus = build_focus(
            round,
            context,
            report,
            &state.pillars.segment_names(),
            &state.evidence,
        );
        debug!(round, collector = %name, prompt = %focus.prompt, "Recollection request built");
        let request = CollectionRequest {
            context: context.clone(),
            focus: Some(focus),
        };

        let call_started = Instant::now();
        let mut output = collector.collect(&request).await;
        if output.provider.is_empty() {
            output.provider = name.clone();
        }
        state.trace.record(
            "recollect",
            name.as_str(),
            output.success,
            call_started.elapsed().as_millis() as u64,
            output.error.clone().unwrap_or_default(),
        );
        if !output.success {
            warn!(
                round,
                collector = %name,
                error = output.error.as_deref().unwrap_or("unknown"),
                "Recollection failed"
            );
            let elapsed = started.elapsed().as_millis() as u64;
            return (state, collector_failed(Some(name), elapsed));
        }

        let before = state.evidence.len();
        let ledger = std::mem::take(&mut state.evidence);
        state.evidence = self.ingest(ledger, std::slice::from_ref(&output), collectors);
        let evidence_added = state.evidence.len().saturating_sub(before);
        if let Some(r) = output.report() {
            state.reports.push(r);
        }
        self.audit_contradictions(&mut state).await;

        let targets = pillars_for_gates(&failing_before);
        self.scheduler()
            .run(
                &targets,
                context,
                &state.evidence,
                &state.reports,
                &mut state.pillars,
                &mut state.trace,
            )
            .await;
        let next = self.finish_pass(context, &mut state).await;

        let status = RoundStatus::classify(true, &failing_before, &next.failed_gate_ids);
        info!(
            round,
            collector = %name,
            added = evidence_added,
            failed = ?next.failed_gate_ids,
            status = ?status,
            "Retry round complete"
        );
        let audit = RetryAuditEntry {
            round,
            failing_before: failing_before.clone(),
            collector: Some(name),
            evidence_added,
            failing_after: next.failed_gate_ids.clone(),
            resynthesized: targets.into_iter().collect(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        (state, RoundResult { audit, report: next })
    }

    /// Initial collection, served from a fresh checkpoint when one exists.
    async fn initial_collection(
        &self,
        context: &ResearchContext,
        collectors: &[Arc<dyn Collector>],
        trace: &mut StageTrace,
    ) -> Vec<CollectorOutput> {
        let store = self
            .checkpoints
            .as_ref()
            .filter(|_| self.config.collection.checkpoint_enabled);
        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        let key = checkpoint_key(context, &names);

        if let Some(store) = store {
            match store.load(&key) {
                Ok(Some(bundle))
                    if bundle.is_fresh(self.config.collection.checkpoint_ttl_secs, Utc::now()) =>
                {
                    info!(key = %key, outputs = bundle.outputs.len(), "Reusing collector checkpoint");
                    trace.record(
                        "collect",
                        "checkpoint",
                        true,
                        0,
                        format!("{} outputs reused", bundle.outputs.len()),
                    );
                    return bundle.outputs;
                }
                Ok(Some(_)) => debug!(key = %key, "Checkpoint expired"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Checkpoint unreadable; collecting fresh"),
            }
        }

        let request = CollectionRequest::initial(context.clone());
        let outputs: Vec<CollectorOutput> = collect_all(collectors, &request)
            .await
            .into_iter()
            .map(|(output, elapsed)| {
                trace.record(
                    "collect",
                    output.provider.as_str(),
                    output.success,
                    elapsed,
                    output.error.clone().unwrap_or_default(),
                );
                output
            })
            .collect();

        if let Some(store) = store {
            if outputs.iter().any(|o| o.success) {
                let bundle = CheckpointBundle::new(key, outputs.clone());
                if let Err(e) = store.save(&bundle) {
                    warn!(error = %e, "Failed to save collector checkpoint");
                }
            }
        }
        outputs
    }

    /// Normalize successful outputs onto `ledger` and deduplicate.
    fn ingest(
        &self,
        ledger: Vec<EvidenceItem>,
        outputs: &[CollectorOutput],
        collectors: &[Arc<dyn Collector>],
    ) -> Vec<EvidenceItem> {
        let normalizer = EvidenceNormalizer::new(self.lexicon);
        let mut items = ledger;
        for output in outputs.iter().filter(|o| o.success) {
            let tags = collectors
                .iter()
                .find(|c| c.name() == output.provider)
                .map(|c| c.default_tags())
                .unwrap_or_default();
            items.extend(normalizer.normalize_report(&output.report_text, &output.provider, &tags));
            items.extend(normalizer.normalize_rows(&output.evidence_rows, &output.provider, &tags));
        }
        let before = items.len();
        let deduped = dedupe(items, self.config.dedup.semantic, &self.lexicon);
        debug!(before, after = deduped.len(), "Evidence deduplicated");
        deduped
    }

    /// Detect, optionally refine, and re-propagate flags over the whole ledger.
    async fn audit_contradictions(&self, state: &mut RunState) {
        let started = Instant::now();
        let candidates = ContradictionDetector::new(self.lexicon).detect(&state.evidence);
        let reports = match &self.refiner {
            Some(refiner) if self.config.contradiction.llm_refine => {
                contradiction::refine(refiner.as_ref(), &state.evidence, candidates).await
            }
            _ => candidates,
        };

        for item in state.evidence.iter_mut() {
            item.conflict_flag = ConflictFlag::None;
        }
        let flagged = propagate_flags(&mut state.evidence, &reports);
        state.trace.record(
            "contradictions",
            "ledger",
            true,
            started.elapsed().as_millis() as u64,
            format!("{} reports, {flagged} items flagged", reports.len()),
        );
        state.contradictions = reports;
    }

    /// Adjudicate, harden and gate the current pillars.
    async fn finish_pass(
        &self,
        context: &ResearchContext,
        state: &mut RunState,
    ) -> QualityGateReport {
        state.pillars = adjudicate::adjudicate(
            self.adjudicator.as_deref(),
            context,
            &state.evidence,
            &state.pillars,
            &self.lexicon,
            &mut state.trace,
        )
        .await;

        let started = Instant::now();
        let log = self.hardener().harden(&state.evidence, &mut state.pillars);
        state.trace.record(
            "harden",
            "all",
            true,
            started.elapsed().as_millis() as u64,
            format!("{} actions", log.len()),
        );
        state.hardening_log.extend(log);

        let started = Instant::now();
        let report = QualityGateEngine::new(self.config.gates.clone())
            .with_lexicon(self.lexicon)
            .evaluate(&state.evidence, &state.contradictions, &state.pillars);
        state.trace.record(
            "gate",
            "all",
            report.overall_pass,
            started.elapsed().as_millis() as u64,
            format!("{} failing", report.failed_gate_ids.len()),
        );
        info!(
            passed = report.overall_pass,
            failed = ?report.failed_gate_ids,
            "Quality gates evaluated"
        );
        report
    }

    fn scheduler(&self) -> SynthesisScheduler {
        let clusterer = EmotionClusterer::new(self.lexicon).with_lf8_minimums(
            self.config.gates.lf8_min_quotes,
            self.config.gates.lf8_min_domains,
        );
        SynthesisScheduler::new(Arc::clone(&self.synthesizer), clusterer)
    }

    fn hardener(&self) -> Hardener {
        Hardener::new(
            self.lexicon,
            self.config.gates.clone(),
            self.config.hardening.clone(),
        )
    }

    fn artifact_writer(&self, run_id: Uuid) -> Option<ArtifactWriter> {
        self.config
            .artifacts
            .output_dir
            .as_ref()
            .map(|dir| ArtifactWriter::new(dir.join(run_id.to_string())))
    }

    /// Persist partial artifacts, then hand back the error to raise.
    fn fail(
        &self,
        writer: Option<&ArtifactWriter>,
        evidence: &[EvidenceItem],
        err: impl Into<GatehouseError>,
    ) -> GatehouseError {
        let err = err.into();
        warn!(error = %err, "Pipeline run failed");
        if let Some(writer) = writer {
            writer.persist_partial(evidence, None, &err.to_string());
        }
        err
    }
}

fn join_ids(ids: &[GateId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
