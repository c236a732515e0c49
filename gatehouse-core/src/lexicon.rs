//! Versioned keyword tables used by the heuristic stages.
//!
//! Every component that classifies text takes a [`Lexicon`] by value, so tests
//! can substitute a small fixture table instead of the built-in `v1` set.
//! Terms are lower-case and matched on word boundaries (see [`crate::text`]).

use crate::pillars::{Lf8Category, PillarKind, QuoteCategory};
use crate::text;

/// A named, versioned set of keyword tables.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon {
    pub version: &'static str,
    pub stopwords: &'static [&'static str],
    pub positive: &'static [&'static str],
    pub negative: &'static [&'static str],
    pub pain: &'static [&'static str],
    pub desire: &'static [&'static str],
    pub objection: &'static [&'static str],
    pub trigger: &'static [&'static str],
    pub proof: &'static [&'static str],
    /// Emotion label followed by the words that signal it.
    pub emotions: &'static [(&'static str, &'static [&'static str])],
    pub lf8: &'static [(Lf8Category, &'static [&'static str])],
    /// Keyword buckets for pillar tagging during normalization.
    pub pillar_buckets: &'static [(PillarKind, &'static [&'static str])],
    pub mechanism: &'static [&'static str],
    pub awareness: &'static [&'static str],
    pub pricing: &'static [&'static str],
    pub story: &'static [&'static str],
    pub authority: &'static [&'static str],
    /// Host suffixes treated as authoritative proof sources.
    pub trusted_domains: &'static [&'static str],
}

impl Lexicon {
    /// The built-in tables.
    pub const fn v1() -> Self {
        Self {
            version: "v1",
            stopwords: STOPWORDS,
            positive: POSITIVE,
            negative: NEGATIVE,
            pain: PAIN,
            desire: DESIRE,
            objection: OBJECTION,
            trigger: TRIGGER,
            proof: PROOF,
            emotions: EMOTIONS,
            lf8: LF8,
            pillar_buckets: PILLAR_BUCKETS,
            mechanism: MECHANISM,
            awareness: AWARENESS,
            pricing: PRICING,
            story: STORY,
            authority: AUTHORITY,
            trusted_domains: TRUSTED_DOMAINS,
        }
    }

    /// Look up a built-in table set by its configured version string.
    pub fn for_version(version: &str) -> Option<Self> {
        match version.trim() {
            "v1" => Some(Self::v1()),
            _ => None,
        }
    }

    /// Vocabulary that marks a quote as belonging to `category`.
    pub fn category_terms(&self, category: QuoteCategory) -> &'static [&'static str] {
        match category {
            QuoteCategory::Pain => self.pain,
            QuoteCategory::Desire => self.desire,
            QuoteCategory::Objection => self.objection,
            QuoteCategory::Trigger => self.trigger,
            QuoteCategory::Proof => self.proof,
        }
    }

    /// Emotion label with the most signal words in `text`, if any.
    pub fn infer_emotion(&self, text: &str) -> Option<&'static str> {
        let padded = text::padded_lower(text);
        let mut best: Option<(&'static str, usize)> = None;
        for &(label, words) in self.emotions {
            let hits = text::count_hits(&padded, words);
            if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
                best = Some((label, hits));
            }
        }
        best.map(|(label, _)| label)
    }

    /// Whether `host` is, or is a subdomain of, a trusted domain.
    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.trusted_domains.iter().any(|d| {
            if d.starts_with('.') {
                host.ends_with(d)
            } else {
                host == *d || host.ends_with(&format!(".{d}"))
            }
        })
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::v1()
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "these", "those", "are", "was", "were", "been",
    "being", "have", "has", "had", "does", "did", "will", "would", "shall", "should", "may",
    "might", "must", "can", "could", "from", "about", "into", "through", "during", "before",
    "after", "above", "below", "between", "its", "it's", "but", "not", "all", "any", "our",
    "your", "their", "they", "them", "you", "she", "her", "his", "him", "who", "what", "when",
    "where", "which", "why", "how", "than", "then", "there", "here", "also", "just", "very",
    "really", "more", "most", "some", "such", "only", "own", "same", "too", "out", "over",
    "under", "again", "once", "each", "both", "few", "other", "i'm", "i've", "don't", "doesn't",
    "didn't", "isn't", "aren't", "wasn't", "can't", "won't", "one", "get", "got", "say", "says",
    "said", "like", "use", "used", "using", "many", "much", "per", "via", "etc",
];

const POSITIVE: &[&str] = &[
    "love", "loved", "great", "excellent", "easy", "easier", "fast", "faster", "reliable",
    "helpful", "affordable", "cheap", "worth", "recommend", "recommended", "best", "amazing",
    "effective", "works", "improved", "better", "happy", "satisfied", "simple", "intuitive",
    "saves", "trust", "trusted", "accurate", "smooth",
];

const NEGATIVE: &[&str] = &[
    "hate", "hated", "terrible", "awful", "slow", "slower", "expensive", "overpriced",
    "confusing", "complicated", "broken", "buggy", "crash", "crashes", "useless", "worse",
    "worst", "unreliable", "frustrating", "disappointed", "waste", "scam", "difficult", "hard",
    "fails", "failed", "inaccurate", "poor", "annoying", "clunky",
];

const PAIN: &[&str] = &[
    "frustrated", "frustrating", "struggle", "struggling", "hate", "annoying", "problem",
    "pain", "waste", "wasted", "stuck", "tired of", "fed up", "can't", "cannot", "hard to",
    "broken", "too long", "overwhelmed", "stressful",
];

const DESIRE: &[&str] = &[
    "wish", "want", "wanted", "hope", "hoping", "dream", "looking for", "would love",
    "need", "needed", "if only", "ideal", "finally", "goal", "easier",
];

const OBJECTION: &[&str] = &[
    "too expensive", "expensive", "not worth", "skeptical", "doubt", "worried", "concern",
    "concerned", "risk", "scam", "not sure", "hesitant", "afraid", "refund", "catch",
];

const TRIGGER: &[&str] = &[
    "finally decided", "decided", "switched", "the moment", "last straw", "that's when",
    "after", "started", "signed up", "bought", "tipping point", "realized",
];

const PROOF: &[&str] = &[
    "results", "saved", "increased", "reduced", "doubled", "tripled", "proven", "study",
    "data", "percent", "guarantee", "certified", "tested", "measured",
];

const EMOTIONS: &[(&str, &[&str])] = &[
    ("frustration", &["frustrated", "frustrating", "annoying", "annoyed", "fed up", "tired of"]),
    ("fear", &["afraid", "scared", "fear", "terrified", "worried", "nervous"]),
    ("anxiety", &["anxious", "anxiety", "stress", "stressed", "stressful", "overwhelmed"]),
    ("hope", &["hope", "hoping", "wish", "dream", "finally"]),
    ("relief", &["relief", "relieved", "peace of mind", "weight off"]),
    ("pride", &["proud", "pride", "accomplished", "confident"]),
    ("shame", &["embarrassed", "ashamed", "shame", "humiliated"]),
    ("anger", &["angry", "furious", "hate", "outraged", "scam"]),
    ("trust", &["trust", "trusted", "reliable", "depend on", "safe"]),
    ("excitement", &["excited", "exciting", "love", "amazing", "can't wait"]),
];

const LF8: &[(Lf8Category, &[&str])] = &[
    (Lf8Category::Survival, &["health", "survive", "live longer", "energy", "pain free", "disease", "sleep"]),
    (Lf8Category::FoodDrink, &["food", "eat", "eating", "drink", "meal", "diet", "taste", "cooking"]),
    (Lf8Category::FreedomFromFear, &["afraid", "fear", "safe", "safety", "risk", "worried", "anxiety", "scared", "protect myself"]),
    (Lf8Category::Companionship, &["partner", "dating", "attractive", "relationship", "romance", "intimacy"]),
    (Lf8Category::ComfortableLiving, &["comfortable", "convenient", "easy", "easier", "time", "hassle", "effortless", "relax"]),
    (Lf8Category::Superiority, &["win", "winning", "beat", "ahead", "competitive", "best", "status", "edge"]),
    (Lf8Category::CareProtection, &["family", "kids", "children", "parents", "loved ones", "protect", "team"]),
    (Lf8Category::SocialApproval, &["respect", "approval", "embarrassed", "judged", "impress", "reputation", "look good"]),
];

const PILLAR_BUCKETS: &[(PillarKind, &[&str])] = &[
    (PillarKind::ProspectProfile, &["customers", "audience", "segment", "buyers", "users", "persona", "demographic", "owners", "founders", "parents"]),
    (PillarKind::VocBank, &["said", "quote", "complained", "wrote", "review", "reviews", "told us"]),
    (PillarKind::CompetitiveIntel, &["competitor", "competitors", "alternative", "alternatives", "versus", "compared", "pricing", "switched from"]),
    (PillarKind::Mechanism, &["because", "mechanism", "root cause", "works by", "causes", "caused by", "the reason"]),
    (PillarKind::Awareness, &["aware", "awareness", "didn't know", "searching for", "comparing", "already use", "heard of"]),
    (PillarKind::EmotionalDrivers, &["feel", "feeling", "frustrated", "afraid", "worried", "proud", "embarrassed", "anxious"]),
    (PillarKind::ProofInventory, &["study", "percent", "results", "testimonial", "case study", "certified", "data", "before and after"]),
];

const MECHANISM: &[&str] = &[
    "because", "mechanism", "root cause", "works by", "causes", "caused by", "the reason",
    "due to", "which means", "leads to",
];

const AWARENESS: &[&str] = &[
    "aware", "awareness", "didn't know", "searching for", "comparing", "already use",
    "heard of", "looking for", "tried", "never heard",
];

const PRICING: &[&str] = &[
    "price", "pricing", "priced", "cost", "costs", "per month", "monthly", "subscription",
    "plan", "plans", "free tier", "tier",
];

const STORY: &[&str] = &[
    "before", "after", "used to", "now i", "went from", "transformed", "turned around",
    "changed my", "since switching",
];

const AUTHORITY: &[&str] = &[
    "study", "according to", "research", "researchers", "published", "journal", "experts",
    "survey of",
];

const TRUSTED_DOMAINS: &[&str] = &[
    ".gov", ".edu", "who.int", "nih.gov", "forbes.com", "nytimes.com", "wsj.com",
    "reuters.com", "bloomberg.com", "hbr.org", "statista.com", "gartner.com", "mckinsey.com",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_version() {
        assert_eq!(Lexicon::for_version("v1").map(|l| l.version), Some("v1"));
        assert!(Lexicon::for_version("v9").is_none());
    }

    #[test]
    fn test_v1_tables_are_lowercase() {
        let lex = Lexicon::v1();
        for table in [lex.positive, lex.negative, lex.pain, lex.desire, lex.objection] {
            for term in table {
                assert_eq!(*term, term.to_lowercase());
            }
        }
    }

    #[test]
    fn test_every_pillar_has_a_bucket() {
        let lex = Lexicon::v1();
        for kind in PillarKind::ALL {
            assert!(lex.pillar_buckets.iter().any(|(k, _)| *k == kind));
        }
    }

    #[test]
    fn test_infer_emotion() {
        let lex = Lexicon::v1();
        assert_eq!(lex.infer_emotion("I was so frustrated and fed up"), Some("frustration"));
        assert_eq!(lex.infer_emotion("Pricing is listed monthly"), None);
    }

    #[test]
    fn test_trusted_hosts() {
        let lex = Lexicon::v1();
        assert!(lex.is_trusted_host("www.nih.gov"));
        assert!(lex.is_trusted_host("cdc.gov"));
        assert!(lex.is_trusted_host("hbr.org"));
        assert!(!lex.is_trusted_host("randomblog.io"));
    }

    #[test]
    fn test_fixture_lexicon_substitution() {
        const FIXTURE: Lexicon = Lexicon {
            version: "fixture",
            positive: &["good"],
            negative: &["bad"],
            ..Lexicon::v1()
        };
        assert_eq!(text::polarity("good good bad", &FIXTURE), 1);
        assert_eq!(FIXTURE.version, "fixture");
    }
}
