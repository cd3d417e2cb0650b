// src/analyzer/html.rs
// =============================================================================
// Pulls the structural facts out of a page's HTML.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM the same way a browser would (html5ever)
// - Lets us find elements with CSS selectors
//
// Extracted:
// - HTML version, from the DOCTYPE declaration
// - the page title
// - how many h1..h6 headings there are
// - every <a href> value, untouched, in document order
// - whether any form looks like a login form (see login.rs)
//
// scraper's Html is not Send, so everything is copied out into PageFacts
// before any .await happens.
// =============================================================================

use std::collections::BTreeMap;

use scraper::{Html, Selector};

use super::login;
use crate::error::AnalysisError;

/// Everything the analyzer needs from the document, detached from the DOM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFacts {
    pub html_version: String,
    pub title: String,
    pub heading_counts: BTreeMap<String, usize>,
    /// Raw href values; classification happens later
    pub links: Vec<String>,
    pub has_login_form: bool,
}

// Builds a selector from a constant string.
// Our selectors are fixed, so a failure here is a programming error, but
// we still report it instead of panicking inside a request.
pub(crate) fn selector(css: &str) -> Result<Selector, AnalysisError> {
    Selector::parse(css).map_err(|e| AnalysisError::Internal(format!("bad selector {css:?}: {e}")))
}

pub fn extract_page(html: &str) -> Result<PageFacts, AnalysisError> {
    let document = Html::parse_document(html);

    Ok(PageFacts {
        html_version: detect_html_version(html).to_string(),
        title: extract_title(&document)?,
        heading_counts: count_headings(&document)?,
        links: extract_hrefs(&document)?,
        has_login_form: login::has_login_form(&document)?,
    })
}

// Looks at the DOCTYPE only. A page without one is "Unknown" even if it
// is otherwise perfectly modern markup.
pub fn detect_html_version(html: &str) -> &'static str {
    let lower = html.to_lowercase();

    let Some(start) = lower.find("<!doctype") else {
        return "Unknown";
    };
    let declaration = match lower[start..].find('>') {
        Some(end) => &lower[start..start + end],
        None => &lower[start..],
    };
    // "<!DOCTYPE   html\n PUBLIC ..." -> "<!doctype html public ..."
    let declaration = declaration.split_whitespace().collect::<Vec<_>>().join(" ");

    if declaration == "<!doctype html" || declaration.contains("about:legacy-compat") {
        return "HTML5";
    }

    // Checked in order; the more specific identifiers come first
    const PUBLIC_IDENTIFIERS: &[(&str, &str)] = &[
        ("xhtml 1.1", "XHTML 1.1"),
        ("xhtml 1.0 strict", "XHTML 1.0 Strict"),
        ("xhtml 1.0 transitional", "XHTML 1.0 Transitional"),
        ("xhtml 1.0 frameset", "XHTML 1.0 Frameset"),
        ("html 4.01 transitional", "HTML 4.01 Transitional"),
        ("html 4.01 frameset", "HTML 4.01 Frameset"),
        ("html 4.01//en", "HTML 4.01 Strict"),
        ("html 4.0", "HTML 4.0"),
        ("html 3.2", "HTML 3.2"),
        ("html 2.0", "HTML 2.0"),
    ];

    for &(identifier, version) in PUBLIC_IDENTIFIERS {
        if declaration.contains(identifier) {
            return version;
        }
    }

    if declaration.contains(" public") {
        return "HTML 4.01";
    }

    "Unknown"
}

fn extract_title(document: &Html) -> Result<String, AnalysisError> {
    let title = document
        .select(&selector("title")?)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    Ok(title)
}

// Only levels that actually appear get an entry
fn count_headings(document: &Html) -> Result<BTreeMap<String, usize>, AnalysisError> {
    let mut counts = BTreeMap::new();
    for level in 1..=6 {
        let tag = format!("h{level}");
        let count = document.select(&selector(&tag)?).count();
        if count > 0 {
            counts.insert(tag, count);
        }
    }
    Ok(counts)
}

fn extract_hrefs(document: &Html) -> Result<Vec<String>, AnalysisError> {
    let links = document
        .select(&selector("a[href]")?)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect();
    Ok(links)
}
