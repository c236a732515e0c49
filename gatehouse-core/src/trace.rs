//! Stage trace persisted as `stage_trace.json`.

use serde::{Deserialize, Serialize};

/// One stage invocation: a collector call, a synthesis, adjudication, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTraceEntry {
    pub stage: String,
    pub target: String,
    pub ok: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageTrace {
    entries: Vec<StageTraceEntry>,
}

impl StageTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: &str,
        target: impl Into<String>,
        ok: bool,
        duration_ms: u64,
        note: impl Into<String>,
    ) {
        self.entries.push(StageTraceEntry {
            stage: stage.to_string(),
            target: target.into(),
            ok,
            duration_ms,
            note: note.into(),
        });
    }

    pub fn entries(&self) -> &[StageTraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for `stage`, in order.
    pub fn for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a StageTraceEntry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_filter() {
        let mut trace = StageTrace::new();
        trace.record("collect", "alpha", true, 12, "");
        trace.record("synthesize", "pillar_1", false, 3, "timeout");
        trace.record("collect", "beta", false, 8, "upstream error");

        assert_eq!(trace.len(), 3);
        let collects: Vec<&str> = trace.for_stage("collect").map(|e| e.target.as_str()).collect();
        assert_eq!(collects, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut trace = StageTrace::new();
        trace.record("adjudicate", "all", true, 5, "");
        let json = serde_json::to_value(&trace).unwrap();
        assert!(json.is_array());
        assert!(json[0].get("note").is_none());
    }
}
