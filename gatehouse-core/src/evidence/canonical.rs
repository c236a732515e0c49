//! URL canonicalization for dedup keys and storage.
//!
//! Lower-cases scheme and host, drops default ports, `www.` prefixes,
//! fragments and known tracking parameters, sorts the remaining query pairs,
//! and strips the trailing slash from non-root paths. Anything that is not an
//! absolute http(s) URL passes through unchanged.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Query parameters that only carry attribution data.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "gbraid", "wbraid", "msclkid", "mc_cid", "mc_eid", "igshid",
    "yclid", "twclid", "ttclid", "_ga", "_gl", "ref_src", "spm",
];

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'`\)\]\}]+"#).expect("url pattern is valid")
});

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonicalize `raw`. Idempotent: `canonicalize_url(&canonicalize_url(u)) == canonicalize_url(u)`.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return raw.to_string();
    }
    let Some(host) = url.host_str().map(str::to_string) else {
        return raw.to_string();
    };

    let bare = host.trim_start_matches("www.");
    if bare != host && !bare.is_empty() && url.set_host(Some(bare)).is_err() {
        return raw.to_string();
    }

    // Default ports are already elided by the parser.
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        url.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }

    url.to_string()
}

/// Whether `candidate` is a syntactically valid absolute http(s) URL with a host.
pub fn is_valid_http_url(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.trim() != candidate {
        return false;
    }
    match Url::parse(candidate) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// All http(s) URLs mentioned in `text`, in order, with trailing punctuation removed.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', '*'])
                .to_string()
        })
        .filter(|u| is_valid_http_url(u))
        .collect()
}
