//! Run artifacts written to the configured output directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::evidence::{EvidenceItem, EvidenceSummary};
use crate::gates::QualityGateReport;
use crate::persistence;
use crate::pipeline::PipelineOutcome;

pub const EVIDENCE_LEDGER: &str = "evidence_ledger.json";
pub const QUALITY_GATE_REPORT: &str = "quality_gate_report.json";
pub const STAGE_TRACE: &str = "stage_trace.json";
pub const CONTRADICTIONS: &str = "contradictions.json";
pub const RETRY_AUDIT: &str = "retry_audit.json";
pub const EVIDENCE_SUMMARY: &str = "evidence_summary.json";
pub const HARDENING_LOG: &str = "hardening_log.json";

/// Writes JSON artifacts for one run into a single directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write every artifact for a finished run. Returns the written paths.
    pub fn write_outcome(&self, outcome: &PipelineOutcome) -> std::io::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(7);
        written.push(self.write(EVIDENCE_LEDGER, &outcome.evidence)?);
        written.push(self.write(QUALITY_GATE_REPORT, &outcome.gate_report)?);
        written.push(self.write(STAGE_TRACE, &outcome.stage_trace)?);
        written.push(self.write(CONTRADICTIONS, &outcome.contradictions)?);
        written.push(self.write(RETRY_AUDIT, &outcome.retry_audit)?);
        written.push(self.write(EVIDENCE_SUMMARY, &outcome.evidence_summary)?);
        written.push(self.write(HARDENING_LOG, &outcome.hardening_log)?);
        info!(
            dir = %self.dir.display(),
            files = written.len(),
            run_id = %outcome.run_id,
            "Artifacts written"
        );
        Ok(written)
    }

    /// Persist what exists before a fatal error: the ledger, its summary and
    /// either the last gate report or a stub with every gate unevaluated.
    ///
    /// Failures are logged, not returned, so the original error wins.
    pub fn persist_partial(
        &self,
        evidence: &[EvidenceItem],
        report: Option<&QualityGateReport>,
        reason: &str,
    ) {
        let stub;
        let report = match report {
            Some(r) => {
                let mut r = r.clone();
                r.warning = Some(reason.to_string());
                stub = r;
                &stub
            }
            None => {
                stub = QualityGateReport::stub(reason);
                &stub
            }
        };
        let results = [
            self.write(EVIDENCE_LEDGER, evidence),
            self.write(EVIDENCE_SUMMARY, &EvidenceSummary::from_items(evidence)),
            self.write(QUALITY_GATE_REPORT, report),
        ];
        for result in results {
            if let Err(e) = result {
                warn!(dir = %self.dir.display(), error = %e, "Failed to persist partial artifact");
            }
        }
        info!(dir = %self.dir.display(), reason, items = evidence.len(), "Partial artifacts persisted");
    }

    fn write<T: serde::Serialize + ?Sized>(&self, name: &str, value: &T) -> std::io::Result<PathBuf> {
        let path = self.path(name);
        persistence::write_json_atomic(&path, value)?;
        Ok(path)
    }
}
