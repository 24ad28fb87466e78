//! Favicon declaration extraction from HTML heads.
//!
//! The head block is sliced out with a tolerant regex scan first, so
//! malformed markup outside the head cannot derail parsing, then the
//! fragment is parsed properly with scraper.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head.*?>.*</head>").expect("invalid regex"));

/// One `<link>` tag parsed from a document head.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LinkCandidate {
    /// `rel` attribute, when present.
    pub rel: Option<String>,
    /// `href` attribute.
    pub href: String,
}

/// Extract the first `<head>...</head>` block, tags included.
///
/// Case-insensitive and tolerant of malformed markup; `None` when the
/// document has no head block, in which case fallback parsing is
/// skipped entirely.
pub fn extract_head(html: &str) -> Option<&str> {
    HEAD_RE.find(html).map(|m| m.as_str())
}

/// Parse `<link>` tags carrying an href from a head fragment, in
/// document order.
pub fn link_candidates(head: &str) -> Vec<LinkCandidate> {
    let document = Html::parse_document(head);
    let selector = Selector::parse("link[href]").expect("invalid selector");

    document
        .select(&selector)
        .map(|element| LinkCandidate {
            rel: element.value().attr("rel").map(str::to_string),
            href: element.value().attr("href").unwrap_or_default().to_string(),
        })
        .collect()
}

/// Pick the favicon declaration from head link tags.
///
/// First match wins, in document order. A tag matches when its rel is
/// `shortcut icon` or `icon` (case-insensitive), or when its href
/// contains the substring `favicon`.
pub fn select_icon(candidates: &[LinkCandidate]) -> Option<&str> {
    candidates
        .iter()
        .find(|candidate| {
            let rel = candidate.rel.as_deref().map(str::to_lowercase);
            matches!(rel.as_deref(), Some("shortcut icon") | Some("icon")) || candidate.href.contains("favicon")
        })
        .map(|candidate| candidate.href.as_str())
}

/// HTML head parsing capability consumed by the resolver.
///
/// Kept as a trait so tests can substitute fakes without touching the
/// resolver.
pub trait HeadExtractor: Send + Sync {
    /// Link tags found in the document's head, in document order.
    fn link_candidates(&self, html: &str) -> Vec<LinkCandidate>;
}

/// Production extractor: regex head slice, then a scraper parse.
#[derive(Debug, Default)]
pub struct DomHeadExtractor;

impl HeadExtractor for DomHeadExtractor {
    fn link_candidates(&self, html: &str) -> Vec<LinkCandidate> {
        match extract_head(html) {
            Some(head) => link_candidates(head),
            None => Vec::new(),
        }
    }
}
