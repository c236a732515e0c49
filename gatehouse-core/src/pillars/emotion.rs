//! Deterministic emotional-driver derivation for pillar 6.
//!
//! Candidate labels are mined from each collector's pillar 6 section,
//! clustered greedily across collectors, backed by VOC quotes and evidence
//! corroborations, and accepted only with adequate support. Accepted drivers
//! feed a per-segment LF8 table. With no usable clusters, drivers are counted
//! straight from quote emotion labels.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::model::{
    DriverSource, EmotionDriver, EmotionalDrivers, Lf8Category, Lf8Row, VocBank, VocQuote,
};
use crate::collector::CollectorReport;
use crate::evidence::{ConflictFlag, EvidenceItem};
use crate::lexicon::Lexicon;
use crate::text;

const MAX_LABEL_WORDS: usize = 10;
const JOIN_OVERLAP: usize = 2;
const JOIN_JACCARD: f64 = 0.45;
const LABEL_KEY_BONUS: usize = 3;
const ATTACH_THRESHOLD: usize = 2;
const CONFIDENCE_CAP: f64 = 0.95;

const DOMINANT_MIN_QUOTES: usize = 8;
const DOMINANT_MIN_SHARE: f64 = 0.05;
const TAIL_MIN_QUOTES: usize = 3;
const TAIL_MIN_SHARE: f64 = 0.02;

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+(.+)$").expect("bullet pattern is valid"));
static PILLAR_N_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpillar\s*(\d+)\b").expect("pillar pattern is valid"));

/// A label proposed by one collector.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCandidate {
    pub provider: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug)]
struct Cluster {
    label: String,
    key: String,
    tokens: BTreeSet<String>,
    description: String,
    providers: BTreeSet<String>,
    quotes: Vec<usize>,
}

/// Sorted stopword-filtered tokens joined by `_`.
pub fn label_key(label: &str, lexicon: &Lexicon) -> String {
    text::tokens(label, lexicon)
        .into_iter()
        .collect::<Vec<_>>()
        .join("_")
}

/// Mine candidate labels from the pillar 6 section of a report.
pub fn mine_candidates(report: &CollectorReport) -> Vec<DriverCandidate> {
    let mut candidates = Vec::new();
    let mut in_section = false;

    for line in report.report_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        let pillar_n = PILLAR_N_RE
            .captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());

        let bullet = BULLET_RE.captures(trimmed).and_then(|c| c.get(1));
        let names_section = lower.contains("emotional drivers") || lower.contains("emotion drivers");
        if pillar_n == Some(6) || (names_section && bullet.is_none()) {
            in_section = true;
            continue;
        }
        if in_section && (trimmed.starts_with('#') || pillar_n.is_some()) {
            in_section = false;
            continue;
        }
        if !in_section {
            continue;
        }

        let Some(body) = bullet else {
            continue;
        };
        let body = body.as_str().replace("**", "").replace("__", "");
        let (label, description) = split_label(&body);
        if label.is_empty() || text::word_count(&label) > MAX_LABEL_WORDS {
            continue;
        }
        candidates.push(DriverCandidate {
            provider: report.provider.clone(),
            label,
            description,
        });
    }
    candidates
}

fn split_label(body: &str) -> (String, String) {
    let cut = [":", " - ", " – "]
        .iter()
        .filter_map(|sep| body.find(sep).map(|idx| (idx, sep.len())))
        .min_by_key(|(idx, _)| *idx);
    match cut {
        Some((idx, len)) => (
            body[..idx].trim().trim_matches('"').trim().to_string(),
            body[idx + len..].trim().to_string(),
        ),
        None => (body.trim().trim_matches('"').trim().to_string(), String::new()),
    }
}

/// Derives pillar 6 from collector reports, the VOC bank and evidence.
#[derive(Debug, Clone)]
pub struct EmotionClusterer {
    lexicon: Lexicon,
    lf8_min_quotes: usize,
    lf8_min_domains: usize,
}

impl EmotionClusterer {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            lf8_min_quotes: 2,
            lf8_min_domains: 2,
        }
    }

    pub fn with_lf8_minimums(mut self, quotes: usize, domains: usize) -> Self {
        self.lf8_min_quotes = quotes;
        self.lf8_min_domains = domains;
        self
    }

    pub fn derive(
        &self,
        reports: &[CollectorReport],
        voc: &VocBank,
        evidence: &[EvidenceItem],
    ) -> EmotionalDrivers {
        let candidates: Vec<DriverCandidate> = reports.iter().flat_map(mine_candidates).collect();
        let quotes: Vec<&VocQuote> = voc.valid_quotes().collect();

        let mut clusters = self.cluster(&candidates);
        self.attach_quotes(&mut clusters, &quotes);

        let drivers: Vec<EmotionDriver> = clusters
            .iter()
            .filter_map(|c| self.accept(c, &quotes, evidence))
            .collect();

        debug!(
            candidates = candidates.len(),
            clusters = clusters.len(),
            accepted = drivers.len(),
            "Clustered emotional driver candidates"
        );

        if drivers.is_empty() {
            return self.voc_fallback(&quotes);
        }
        let lf8 = self.lf8_table(&drivers, &quotes, evidence);
        EmotionalDrivers {
            drivers,
            lf8,
            source: DriverSource::CollectorClusters,
        }
    }

    fn cluster(&self, candidates: &[DriverCandidate]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        for candidate in candidates {
            let tokens = text::tokens(&candidate.label, &self.lexicon);
            if tokens.is_empty() {
                continue;
            }
            let key = tokens.iter().cloned().collect::<Vec<_>>().join("_");
            let joined = clusters.iter_mut().find(|c| {
                c.key == key
                    || text::overlap(&c.tokens, &tokens) >= JOIN_OVERLAP
                    || text::jaccard(&c.tokens, &tokens) >= JOIN_JACCARD
            });
            match joined {
                Some(cluster) => {
                    cluster.tokens.extend(tokens);
                    cluster.providers.insert(candidate.provider.clone());
                    if cluster.description.is_empty() {
                        cluster.description = candidate.description.clone();
                    }
                }
                None => clusters.push(Cluster {
                    label: candidate.label.clone(),
                    key,
                    tokens,
                    description: candidate.description.clone(),
                    providers: BTreeSet::from([candidate.provider.clone()]),
                    quotes: Vec::new(),
                }),
            }
        }
        clusters
    }

    fn attach_quotes(&self, clusters: &mut [Cluster], quotes: &[&VocQuote]) {
        if clusters.is_empty() {
            return;
        }
        for (qi, quote) in quotes.iter().enumerate() {
            let qtoks = text::tokens(&quote.text, &self.lexicon);
            let qkey = quote
                .emotion
                .as_deref()
                .map(|e| label_key(e, &self.lexicon))
                .unwrap_or_default();

            let mut best: Option<(usize, usize)> = None;
            for (ci, cluster) in clusters.iter().enumerate() {
                let mut score = text::overlap(&qtoks, &cluster.tokens);
                if !qkey.is_empty() && qkey == cluster.key {
                    score += LABEL_KEY_BONUS;
                }
                if best.is_none_or(|(_, b)| score > b) {
                    best = Some((ci, score));
                }
            }
            if let Some((ci, score)) = best {
                if score >= ATTACH_THRESHOLD {
                    clusters[ci].quotes.push(qi);
                }
            }
        }
    }

    fn corroborations(&self, cluster: &Cluster, evidence: &[EvidenceItem]) -> (usize, Vec<String>) {
        let required = if cluster.tokens.len() == 1 { 1 } else { 2 };
        let mut sources = BTreeSet::new();
        let mut ids = Vec::new();
        for item in evidence {
            let toks = text::tokens(&item.text(), &self.lexicon);
            if text::overlap(&toks, &cluster.tokens) >= required {
                sources.insert(item.source_key());
                ids.push(item.evidence_id.clone());
            }
        }
        (sources.len(), ids)
    }

    fn accept(
        &self,
        cluster: &Cluster,
        quotes: &[&VocQuote],
        evidence: &[EvidenceItem],
    ) -> Option<EmotionDriver> {
        let providers = cluster.providers.len();
        let quote_count = cluster.quotes.len();
        let (corroborations, evidence_ids) = self.corroborations(cluster, evidence);

        let supported = if providers >= 2 {
            quote_count >= 1 || corroborations >= 2
        } else {
            quote_count >= 2 || corroborations >= 3
        };
        if !supported {
            debug!(
                label = %cluster.label,
                providers,
                quotes = quote_count,
                corroborations,
                "Rejected unsupported emotion cluster"
            );
            return None;
        }

        let confidence = (0.5
            + 0.1 * providers.saturating_sub(1).min(2) as f64
            + 0.05 * quote_count.min(4) as f64
            + 0.03 * corroborations.min(3) as f64)
            .min(CONFIDENCE_CAP);
        let share = if quotes.is_empty() {
            0.0
        } else {
            quote_count as f64 / quotes.len() as f64
        };

        Some(EmotionDriver {
            label: cluster.label.clone(),
            description: cluster.description.clone(),
            providers: cluster.providers.clone(),
            quote_ids: cluster.quotes.iter().map(|&i| quotes[i].quote_id.clone()).collect(),
            evidence_ids,
            confidence,
            share,
            dominant: providers >= 2 && quote_count >= 2,
        })
    }

    /// LF8 category with the most hint hits; ties resolve in category order.
    fn classify_lf8(&self, driver: &EmotionDriver, quotes: &[&VocQuote]) -> Option<Lf8Category> {
        let mut body = format!("{} {}", driver.label, driver.description);
        for quote in quotes.iter().filter(|q| driver.quote_ids.contains(&q.quote_id)) {
            body.push(' ');
            body.push_str(&quote.text);
        }
        let padded = text::padded_lower(&body);
        let mut best: Option<(Lf8Category, usize)> = None;
        for &(category, hints) in self.lexicon.lf8 {
            let hits = text::count_hits(&padded, hints);
            if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
                best = Some((category, hits));
            }
        }
        best.map(|(category, _)| category)
    }

    fn lf8_table(
        &self,
        drivers: &[EmotionDriver],
        quotes: &[&VocQuote],
        evidence: &[EvidenceItem],
    ) -> Vec<Lf8Row> {
        let flags: HashMap<&str, ConflictFlag> = evidence
            .iter()
            .map(|e| (e.evidence_id.as_str(), e.conflict_flag))
            .collect();
        let by_id: HashMap<&str, &VocQuote> =
            quotes.iter().map(|q| (q.quote_id.as_str(), *q)).collect();

        let mut rows: BTreeMap<(String, Lf8Category), Lf8Row> = BTreeMap::new();
        for driver in drivers {
            let Some(category) = self.classify_lf8(driver, quotes) else {
                continue;
            };
            for quote_id in &driver.quote_ids {
                let Some(quote) = by_id.get(quote_id.as_str()) else {
                    continue;
                };
                if quote.segment.trim().is_empty() {
                    continue;
                }
                let row = rows
                    .entry((quote.segment.clone(), category))
                    .or_insert_with(|| Lf8Row {
                        segment: quote.segment.clone(),
                        category,
                        driver_labels: Vec::new(),
                        quote_ids: Vec::new(),
                        evidence_ids: Vec::new(),
                        domains: BTreeSet::new(),
                    });
                if !row.driver_labels.contains(&driver.label) {
                    row.driver_labels.push(driver.label.clone());
                }
                if !row.quote_ids.contains(quote_id) {
                    row.quote_ids.push(quote_id.clone());
                }
                if let Some(domain) = quote.domain() {
                    row.domains.insert(domain);
                }
                if let Some(id) = &quote.evidence_id {
                    if !row.evidence_ids.contains(id) {
                        row.evidence_ids.push(id.clone());
                    }
                }
            }
            for row in rows.values_mut().filter(|r| r.driver_labels.contains(&driver.label)) {
                for id in &driver.evidence_ids {
                    if !row.evidence_ids.contains(id) {
                        row.evidence_ids.push(id.clone());
                    }
                }
            }
        }

        rows.into_values()
            .filter(|row| {
                let blocked = row
                    .evidence_ids
                    .iter()
                    .any(|id| flags.get(id.as_str()) == Some(&ConflictFlag::HighUnresolved));
                let keep = row.quote_ids.len() >= self.lf8_min_quotes
                    && row.domains.len() >= self.lf8_min_domains
                    && !blocked;
                if !keep {
                    debug!(
                        segment = %row.segment,
                        category = ?row.category,
                        quotes = row.quote_ids.len(),
                        domains = row.domains.len(),
                        blocked,
                        "Dropped LF8 row"
                    );
                }
                keep
            })
            .collect()
    }

    /// Count quotes by their own (or inferred) emotion label.
    fn voc_fallback(&self, quotes: &[&VocQuote]) -> EmotionalDrivers {
        let mut buckets: BTreeMap<String, (Vec<String>, BTreeSet<String>)> = BTreeMap::new();
        for quote in quotes {
            let label = quote
                .emotion
                .as_deref()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .or_else(|| self.lexicon.infer_emotion(&quote.text).map(String::from))
                .unwrap_or_else(|| "general".to_string());
            let entry = buckets.entry(label).or_default();
            entry.0.push(quote.quote_id.clone());
            entry.1.insert(quote.provider.clone());
        }

        let total = quotes.len();
        let mut ranked: Vec<(String, Vec<String>, BTreeSet<String>)> = buckets
            .into_iter()
            .map(|(label, (ids, providers))| (label, ids, providers))
            .collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

        let share_of = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        let mut drivers: Vec<EmotionDriver> = ranked
            .iter()
            .filter_map(|(label, ids, providers)| {
                let n = ids.len();
                let share = share_of(n);
                let dominant = n >= DOMINANT_MIN_QUOTES && share >= DOMINANT_MIN_SHARE;
                let tail = n >= TAIL_MIN_QUOTES || share >= TAIL_MIN_SHARE;
                (dominant || tail).then(|| fallback_driver(label, ids, providers, share, dominant))
            })
            .collect();

        if drivers.is_empty() {
            if let Some((label, ids, providers)) = ranked.first() {
                drivers.push(fallback_driver(label, ids, providers, share_of(ids.len()), false));
            }
        }

        debug!(
            quotes = total,
            drivers = drivers.len(),
            "Derived emotional drivers from VOC labels"
        );
        EmotionalDrivers {
            drivers,
            lf8: Vec::new(),
            source: DriverSource::VocFallback,
        }
    }
}

fn fallback_driver(
    label: &str,
    ids: &[String],
    providers: &BTreeSet<String>,
    share: f64,
    dominant: bool,
) -> EmotionDriver {
    let confidence = (0.5
        + 0.1 * providers.len().saturating_sub(1).min(2) as f64
        + 0.05 * ids.len().min(4) as f64)
        .min(CONFIDENCE_CAP);
    EmotionDriver {
        label: label.to_string(),
        description: String::new(),
        providers: providers.clone(),
        quote_ids: ids.to_vec(),
        evidence_ids: Vec::new(),
        confidence,
        share,
        dominant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SourceType;
    use crate::evidence::test_support::item;
    use crate::pillars::model::QuoteCategory;

    fn report(provider: &str, text: &str) -> CollectorReport {
        CollectorReport {
            provider: provider.into(),
            report_text: text.into(),
        }
    }

    fn quote(id: &str, text: &str, segment: &str, url: &str) -> VocQuote {
        VocQuote {
            quote_id: id.into(),
            text: text.into(),
            category: QuoteCategory::Pain,
            segment: segment.into(),
            emotion: None,
            theme: None,
            source_url: url.into(),
            source_type: SourceType::Review,
            evidence_id: None,
            provider: "alpha".into(),
        }
    }

    const ALPHA: &str = "\
## Pillar 5: Awareness
- Problem aware: most buyers
## Pillar 6: Emotional drivers
- **Fear of wasting money**: buyers worry the tool will sit unused
- Embarrassment in front of clients - late reports make them look bad
- A label that is far too long to be a real driver label and should be skipped: x
## Pillar 7: Proof
- Case studies: few
";

    const BETA: &str = "\
Emotional drivers
1. Fear of losing money on unused seats
2. Pride in polished client deliverables
";

    #[test]
    fn test_mine_candidates_from_section_only() {
        let candidates = mine_candidates(&report("alpha", ALPHA));
        let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Fear of wasting money", "Embarrassment in front of clients"]);
        assert_eq!(candidates[0].description, "buyers worry the tool will sit unused");
    }

    #[test]
    fn test_mine_numbered_candidates_without_separator() {
        let candidates = mine_candidates(&report("beta", BETA));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].label, "Fear of losing money on unused seats");
    }

    #[test]
    fn test_label_key_is_order_insensitive() {
        let lex = Lexicon::v1();
        assert_eq!(label_key("Money fear", &lex), label_key("fear of money", &lex));
    }

    #[test]
    fn test_candidates_cluster_across_providers() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let candidates: Vec<_> = [report("alpha", ALPHA), report("beta", BETA)]
            .iter()
            .flat_map(mine_candidates)
            .collect();
        let clusters = clusterer.cluster(&candidates);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].providers.len(), 2);
    }

    #[test]
    fn test_multi_provider_cluster_with_quote_is_accepted() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let voc = VocBank {
            quotes: vec![quote(
                "q1",
                "I am afraid of wasting money on seats nobody uses",
                "Agencies",
                "https://g2.com/a",
            )],
        };
        let drivers = clusterer.derive(
            &[report("alpha", ALPHA), report("beta", BETA)],
            &voc,
            &[],
        );
        assert_eq!(drivers.source, DriverSource::CollectorClusters);
        assert_eq!(drivers.drivers.len(), 1);
        let driver = &drivers.drivers[0];
        assert_eq!(driver.label, "Fear of wasting money");
        assert_eq!(driver.quote_ids, vec!["q1".to_string()]);
        // 0.5 + 0.1 (two providers) + 0.05 (one quote)
        assert!((driver.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_single_quote_single_provider_cluster_is_excluded_from_lf8() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let single = "Pillar 6\n- Family safety worries: parents fear for their kids\n";
        let voc = VocBank {
            quotes: vec![quote(
                "q1",
                "As parents we worry about family safety every day",
                "Parents",
                "https://reddit.com/r/parenting/1",
            )],
        };
        let drivers = clusterer.derive(&[report("alpha", single)], &voc, &[]);
        assert_eq!(drivers.source, DriverSource::VocFallback);
        assert!(drivers.lf8.iter().all(|row| row.segment != "Parents"));
    }

    #[test]
    fn test_lf8_row_requires_quotes_domains_and_no_conflict() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let text = "Pillar 6\n- Fear of wasting money\n";
        let mut q1 = quote("q1", "Afraid of wasting money again", "Agencies", "https://g2.com/a");
        let q2 = quote("q2", "Wasting money on tools scares me", "Agencies", "https://reddit.com/r/x/1");
        q1.evidence_id = Some("ev_1".into());
        let voc = VocBank { quotes: vec![q1, q2] };

        let drivers = clusterer.derive(&[report("alpha", text)], &voc, &[]);
        assert_eq!(drivers.lf8.len(), 1);
        assert_eq!(drivers.lf8[0].category, Lf8Category::FreedomFromFear);
        assert_eq!(drivers.lf8[0].domains.len(), 2);

        let mut flagged = item("ev_1", "unrelated claim text here", "https://g2.com/a", "alpha", 0.8);
        flagged.conflict_flag = ConflictFlag::HighUnresolved;
        let drivers = clusterer.derive(&[report("alpha", text)], &voc, &[flagged]);
        assert!(drivers.lf8.is_empty());
    }

    #[test]
    fn test_voc_fallback_buckets() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let mut quotes = Vec::new();
        for i in 0..9 {
            let mut q = quote(&format!("f{i}"), "export keeps failing", "A", "https://g2.com/a");
            q.emotion = Some("Frustration".into());
            quotes.push(q);
        }
        for i in 0..3 {
            quotes.push(quote(&format!("h{i}"), "I hope it finally works", "A", "https://g2.com/b"));
        }
        let drivers = clusterer.derive(&[], &VocBank { quotes }, &[]);
        assert_eq!(drivers.source, DriverSource::VocFallback);
        let labels: Vec<&str> = drivers.drivers.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["frustration", "hope"]);
        assert!(drivers.drivers[0].dominant);
        assert!(!drivers.drivers[1].dominant);
    }

    #[test]
    fn test_voc_fallback_keeps_largest_when_none_qualify() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let mut quotes = Vec::new();
        for i in 0..60 {
            let mut q = quote(&format!("q{i}"), "plain text", "A", "https://g2.com/a");
            q.emotion = Some(format!("label{i}"));
            quotes.push(q);
        }
        let drivers = clusterer.derive(&[], &VocBank { quotes }, &[]);
        assert_eq!(drivers.drivers.len(), 1);
    }

    #[test]
    fn test_no_quotes_no_clusters_yields_empty() {
        let clusterer = EmotionClusterer::new(Lexicon::v1());
        let drivers = clusterer.derive(&[], &VocBank::default(), &[]);
        assert!(drivers.drivers.is_empty());
    }
}
