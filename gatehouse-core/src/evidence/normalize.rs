//! Turns collector output into typed [`EvidenceItem`]s.
//!
//! Free-text reports go through line filtering, URL inheritance, fragment
//! splitting and noise stripping; pre-structured rows reuse the same cleaning,
//! URL and leakage rules. Malformed fragments are dropped, never surfaced.

use std::collections::{BTreeSet, VecDeque};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

use super::canonical::{canonicalize_url, extract_urls, is_valid_http_url};
use super::{ConflictFlag, EvidenceItem, EvidenceRow, SourceType};
use crate::lexicon::Lexicon;
use crate::pillars::PillarKind;
use crate::text;

const LONG_LINE_CHARS: usize = 220;
const MIN_FRAGMENT_WORDS: usize = 8;
const VERBATIM_MAX_CHARS: usize = 300;
const CLAIM_MAX_CHARS: usize = 600;
const URL_WINDOW: usize = 5;
const CONFIDENCE_FLOOR: f64 = 0.05;
const CONFIDENCE_CEILING: f64 = 0.97;

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•+▪◦]|\d{1,3}[.)])\s+").expect("bullet pattern is valid"));
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link pattern is valid"));
static BARE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•+]\s*)?(?:\[[^\]]*\]\([^)]*\)[\s,;]*)+$").expect("bare link pattern is valid")
});
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\^?\d+\]|【[^】]*】|<cite>.*?</cite>|\[(?:source|citation|cite)[^\]]*\]")
        .expect("citation pattern is valid")
});
static URL_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\)\]\}]+"#).expect("url pattern is valid"));
static EMPTY_PARENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*[,;]?\s*\)").expect("parens pattern is valid"));
static PILLAR_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[*_#>\s]*pillar\s*\d+\b").expect("pillar label pattern is valid"));
static BOLD_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*[^*]+\*\*:?$|^__[^_]+__:?$").expect("bold line pattern is valid"));
static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“]([^"“”]{12,})["”]"#).expect("quote pattern is valid"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})-(\d{2})(?:-(\d{2}))?\b").expect("date pattern is valid")
});

/// Host suffixes that identify a source type. Checked in order.
const HOST_HINTS: &[(SourceType, &[&str])] = &[
    (SourceType::Reddit, &["reddit.com", "redd.it"]),
    (
        SourceType::Review,
        &[
            "trustpilot.com", "g2.com", "capterra.com", "yelp.com", "amazon.com", "tripadvisor.com",
            "getapp.com", "sitejabber.com", "bbb.org", "producthunt.com", "trustradius.com",
        ],
    ),
    (
        SourceType::AdLibrary,
        &["adstransparency.google.com", "library.tiktok.com", "ads.tiktok.com"],
    ),
    (
        SourceType::Forum,
        &["quora.com", "stackexchange.com", "stackoverflow.com", "discourse.org"],
    ),
    (SourceType::Survey, &["typeform.com", "surveymonkey.com", "forms.gle", "qualtrics.com"]),
    (SourceType::Support, &["zendesk.com", "intercom.help", "freshdesk.com"]),
];

/// Social hosts, checked after path hints so ad-library paths win.
const SOCIAL_HOSTS: &[&str] = &[
    "twitter.com", "x.com", "tiktok.com", "instagram.com", "youtube.com", "linkedin.com",
    "facebook.com", "threads.net", "pinterest.com",
];

/// Host prefixes and path fragments that identify a source type.
const PATH_HINTS: &[(SourceType, &[&str])] = &[
    (SourceType::AdLibrary, &["/ads/library"]),
    (SourceType::Forum, &["forum.", "community.", "/forum", "/community", "/thread"]),
    (SourceType::Support, &["support.", "help.", "/support", "/help"]),
    (SourceType::Survey, &["/survey"]),
    (SourceType::Review, &["/reviews", "/review/"]),
];

/// Body-text phrases that identify a source type when the URL does not.
const TEXT_HINTS: &[(SourceType, &[&str])] = &[
    (SourceType::Reddit, &["reddit", "subreddit", "redditor"]),
    (SourceType::AdLibrary, &["ad library", "ads library", "facebook ad", "running ads", "ad copy"]),
    (SourceType::Review, &["review", "reviews", "reviewer", "stars", "rated", "star rating"]),
    (SourceType::Survey, &["survey", "respondents", "poll"]),
    (SourceType::Support, &["support ticket", "help center", "helpdesk", "customer support"]),
    (SourceType::Forum, &["forum", "thread", "quora"]),
    (SourceType::Social, &["tweet", "tiktok", "instagram", "youtube", "linkedin"]),
];

/// Converts raw collector output into evidence items.
#[derive(Debug, Clone)]
pub struct EvidenceNormalizer {
    lexicon: Lexicon,
    as_of: NaiveDate,
}

impl EvidenceNormalizer {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            as_of: Utc::now().date_naive(),
        }
    }

    /// Fix the reference date used for the recency adjustment.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Normalize a free-text report from `provider`.
    pub fn normalize_report(
        &self,
        report: &str,
        provider: &str,
        default_tags: &[PillarKind],
    ) -> Vec<EvidenceItem> {
        let mut window: VecDeque<String> = VecDeque::with_capacity(URL_WINDOW);
        let mut items = Vec::new();
        let mut position = 0usize;
        let mut dropped = 0usize;

        for raw_line in report.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            let line_urls: Vec<String> = extract_urls(line)
                .iter()
                .map(|u| canonicalize_url(u))
                .collect();
            for url in &line_urls {
                remember_url(&mut window, url);
            }

            if is_scaffold(line) {
                continue;
            }

            for fragment in split_fragments(line) {
                let cleaned = strip_noise(&fragment);
                if cleaned.is_empty() || text::looks_like_leakage(&cleaned) {
                    dropped += 1;
                    continue;
                }
                if text::word_count(&cleaned) < MIN_FRAGMENT_WORDS && !text::is_quote_like(&cleaned)
                {
                    continue;
                }

                let url = extract_urls(&fragment)
                    .last()
                    .map(|u| canonicalize_url(u))
                    .or_else(|| line_urls.last().cloned())
                    .or_else(|| window.back().cloned())
                    .unwrap_or_default();

                position += 1;
                let verbatim = quoted_excerpt(&cleaned).unwrap_or_else(|| cleaned.clone());
                items.push(self.build_item(Draft {
                    claim: cleaned,
                    verbatim,
                    url,
                    source_type: None,
                    published_date: None,
                    tags: Vec::new(),
                    confidence: None,
                    provider,
                    default_tags,
                    position: format!("{provider}:{position}"),
                }));
            }
        }

        debug!(
            provider,
            items = items.len(),
            dropped,
            "Normalized free-text report"
        );
        items
    }

    /// Normalize pre-structured rows from `provider`.
    pub fn normalize_rows(
        &self,
        rows: &[EvidenceRow],
        provider: &str,
        default_tags: &[PillarKind],
    ) -> Vec<EvidenceItem> {
        let mut items = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;

        for (idx, row) in rows.iter().enumerate() {
            let claim = strip_noise(&row.claim);
            if claim.is_empty() || text::looks_like_leakage(&claim) {
                dropped += 1;
                continue;
            }
            let verbatim = row
                .verbatim
                .as_deref()
                .map(strip_noise)
                .filter(|v| !v.is_empty() && !text::looks_like_leakage(v))
                .or_else(|| quoted_excerpt(&claim))
                .unwrap_or_else(|| claim.clone());
            let url = row
                .source_url
                .as_deref()
                .map(|u| canonicalize_url(u.trim()))
                .unwrap_or_default();
            let tags: Vec<PillarKind> = row
                .pillar_tags
                .iter()
                .filter_map(|t| PillarKind::parse(t))
                .collect();

            items.push(self.build_item(Draft {
                claim,
                verbatim,
                url,
                source_type: row.source_type.as_deref().and_then(SourceType::parse),
                published_date: row.published_date.clone(),
                tags,
                confidence: row.confidence,
                provider,
                default_tags,
                position: format!("{provider}:row:{idx}"),
            }));
        }

        if dropped > 0 {
            debug!(provider, dropped, "Dropped malformed evidence rows");
        }
        items
    }

    fn build_item(&self, draft: Draft<'_>) -> EvidenceItem {
        let claim = text::truncate_chars(&draft.claim, CLAIM_MAX_CHARS);
        let verbatim = text::truncate_chars(&draft.verbatim, VERBATIM_MAX_CHARS);
        let url_valid = is_valid_http_url(&draft.url);
        let source_url = if url_valid { draft.url } else { String::new() };
        let body = format!("{claim} {verbatim}");

        let source_type = draft
            .source_type
            .unwrap_or_else(|| infer_source_type(&source_url, &body));
        let quote_like = text::is_quote_like(&verbatim);

        let detected_date = detect_date(&body);
        let published_date = draft
            .published_date
            .or_else(|| detected_date.as_ref().map(|(label, _)| label.clone()));
        let recency = detected_date
            .map(|(_, date)| self.recency_adjustment(date))
            .unwrap_or(0.0);

        let confidence = match draft.confidence.filter(|c| c.is_finite()) {
            Some(c) => c.clamp(0.0, 1.0),
            None => score_confidence(source_type, url_valid, quote_like, recency),
        };

        let mut pillar_tags: BTreeSet<PillarKind> = draft.tags.into_iter().collect();
        if pillar_tags.is_empty() {
            pillar_tags = self.infer_tags(&body, quote_like, draft.default_tags);
        }

        let evidence_id = format!(
            "ev_{}",
            text::short_hash(&format!("{claim}\u{1f}{source_url}\u{1f}{}", draft.position), 16)
        );

        EvidenceItem {
            evidence_id,
            claim,
            verbatim,
            source_url,
            source_type,
            published_date,
            pillar_tags,
            confidence,
            provider: draft.provider.to_string(),
            conflict_flag: ConflictFlag::None,
            corroborating_sources: BTreeSet::new(),
        }
    }

    /// Keyword-bucket tagging with a narrow fallback.
    fn infer_tags(
        &self,
        body: &str,
        quote_like: bool,
        default_tags: &[PillarKind],
    ) -> BTreeSet<PillarKind> {
        let padded = text::padded_lower(body);
        let tags: BTreeSet<PillarKind> = self
            .lexicon
            .pillar_buckets
            .iter()
            .filter(|(_, words)| text::count_hits(&padded, words) > 0)
            .map(|(kind, _)| *kind)
            .collect();
        if !tags.is_empty() {
            return tags;
        }
        if !default_tags.is_empty() {
            return default_tags.iter().take(2).copied().collect();
        }
        if quote_like {
            BTreeSet::from([PillarKind::VocBank])
        } else {
            BTreeSet::from([PillarKind::ProspectProfile])
        }
    }

    fn recency_adjustment(&self, date: NaiveDate) -> f64 {
        let age_days = (self.as_of - date).num_days();
        if (0..=365).contains(&age_days) {
            0.03
        } else if age_days > 3 * 365 {
            -0.03
        } else {
            0.0
        }
    }
}

impl Default for EvidenceNormalizer {
    fn default() -> Self {
        Self::new(Lexicon::v1())
    }
}

struct Draft<'a> {
    claim: String,
    verbatim: String,
    url: String,
    source_type: Option<SourceType>,
    published_date: Option<String>,
    tags: Vec<PillarKind>,
    confidence: Option<f64>,
    provider: &'a str,
    default_tags: &'a [PillarKind],
    position: String,
}

/// Confidence from source weight, URL validity, quote shape, type and recency,
/// clamped to [0.05, 0.97].
pub fn score_confidence(
    source_type: SourceType,
    url_valid: bool,
    quote_like: bool,
    recency: f64,
) -> f64 {
    let mut score = source_type.base_weight();
    score += if url_valid { 0.10 } else { -0.12 };
    if quote_like {
        score += 0.07;
    }
    if source_type == SourceType::Other {
        score -= 0.15;
    }
    score += recency;
    score.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Infer the source type from URL host/path first, then body keywords.
pub fn infer_source_type(url: &str, body: &str) -> SourceType {
    if let Ok(parsed) = url::Url::parse(url) {
        let host = parsed
            .host_str()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .to_ascii_lowercase();
        let on_host = |s: &&str| host == *s || host.ends_with(&format!(".{s}"));
        for (kind, suffixes) in HOST_HINTS {
            if suffixes.iter().any(on_host) {
                return *kind;
            }
        }
        let location = format!("{host}{}", parsed.path().to_ascii_lowercase());
        for (kind, hints) in PATH_HINTS {
            if hints.iter().any(|h| location.contains(h)) {
                return *kind;
            }
        }
        if SOCIAL_HOSTS.iter().any(on_host) {
            return SourceType::Social;
        }
    }

    if body
        .split_whitespace()
        .any(|w| w.to_ascii_lowercase().starts_with("r/"))
    {
        return SourceType::Reddit;
    }
    let padded = text::padded_lower(body);
    for (kind, hints) in TEXT_HINTS {
        if text::count_hits(&padded, hints) > 0 {
            return *kind;
        }
    }

    if is_valid_http_url(url) {
        SourceType::LandingPage
    } else {
        SourceType::Other
    }
}

fn remember_url(window: &mut VecDeque<String>, url: &str) {
    if !is_valid_http_url(url) {
        return;
    }
    window.retain(|u| u != url);
    if window.len() == URL_WINDOW {
        window.pop_front();
    }
    window.push_back(url.to_string());
}

/// Headings, table rules, bare links, pillar labels and section labels.
fn is_scaffold(line: &str) -> bool {
    if line.starts_with('#') {
        return true;
    }
    if line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '=' | '*' | '_')) {
        return true;
    }
    if BARE_LINK_RE.is_match(line) {
        return true;
    }
    let without_bullet = BULLET_RE.replace(line, "");
    let without_urls = URL_STRIP_RE.replace_all(&without_bullet, "");
    if without_urls.trim_matches(|c: char| c.is_whitespace() || ",;()<>".contains(c)).is_empty() {
        return true;
    }
    if PILLAR_LABEL_RE.is_match(line) && text::word_count(line) <= 8 {
        return true;
    }
    if BOLD_LINE_RE.is_match(line) {
        return true;
    }
    let unbolded = line.replace("**", "").replace("__", "");
    let unbolded = unbolded.trim();
    unbolded.ends_with(':') && text::word_count(unbolded) <= 6
}

/// Split long lines into sentence-like fragments.
fn split_fragments(line: &str) -> Vec<String> {
    if line.chars().count() <= LONG_LINE_CHARS {
        return vec![line.to_string()];
    }
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | ';') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            let frag = current.trim().to_string();
            if !frag.is_empty() {
                fragments.push(frag);
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        fragments.push(tail.to_string());
    }
    fragments
}

/// Remove bullets, markdown emphasis, links, URLs and citation tags.
pub(crate) fn strip_noise(fragment: &str) -> String {
    let s = BULLET_RE.replace(fragment, "");
    let s = CITATION_RE.replace_all(&s, "");
    let s = MD_LINK_RE.replace_all(&s, "$1");
    let s = URL_STRIP_RE.replace_all(&s, "");
    let s = EMPTY_PARENS_RE.replace_all(&s, "");
    let s = s.replace("**", "").replace("__", "");
    let s = text::collapse_whitespace(&s);
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—' | ':' | '|' | '*'))
        .to_string()
}

/// A quoted excerpt of at least three words, if the fragment contains one.
fn quoted_excerpt(fragment: &str) -> Option<String> {
    QUOTE_RE
        .captures_iter(fragment)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|q| text::word_count(q) >= 3)
}

/// First ISO-like date: returns its label (`YYYY-MM[-DD]`) and parsed value.
fn detect_date(body: &str) -> Option<(String, NaiveDate)> {
    for caps in DATE_RE.captures_iter(body) {
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let day: Option<u32> = caps.get(3).and_then(|d| d.as_str().parse().ok());
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day.unwrap_or(1)) {
            let label = match day {
                Some(_) => date.format("%Y-%m-%d").to_string(),
                None => format!("{:04}-{:02}", date.year(), date.month()),
            };
            return Some((label, date));
        }
    }
    None
}
