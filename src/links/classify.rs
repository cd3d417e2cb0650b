// src/links/classify.rs
// =============================================================================
// Decides what a raw href from the page actually points at.
//
// Given the href exactly as it appeared in the document and the URL of the
// page it came from, we either:
// - skip it (fragment, empty, javascript:, mailto:, ...), or
// - resolve it to an absolute URL and tag it internal or external
//
// Internal means "same hostname as the analyzed page". The port is not part
// of the comparison, so http://site.test:8080/x is internal to
// https://site.test/.
//
// Everything in here is pure: no I/O, no shared state. Workers call it from
// any thread.
// =============================================================================

use url::Url;

use super::LinkError;

// Protocols that never point at a navigable web page.
// Matched as a case-insensitive prefix of the trimmed href.
const SPECIAL_PROTOCOLS: &[&str] = &[
    "javascript:",
    "mailto:",
    "tel:",
    "ftp:",
    "file:",
    "data:",
    "blob:",
    "chrome:",
    "chrome-extension:",
    "moz-extension:",
    "about:",
];

/// What the classifier decided about one href
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not a navigable page (anchor, empty, special protocol)
    Skip,
    /// A web URL, resolved against the page URL
    Resolved { url: Url, internal: bool },
}

// Classifies a single href relative to the page it was found on.
//
// Examples (base = https://example.com/a/b):
//   ""                       -> Skip
//   "#top"                   -> Skip
//   "mailto:a@b.com"         -> Skip
//   "../c"                   -> Resolved(https://example.com/c, internal)
//   "https://other.test/x"   -> Resolved(https://other.test/x, external)
//   "http://[::1"            -> Err(LinkError::Resolve)
pub fn classify(href: &str, base: &Url) -> Result<Classification, LinkError> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return Ok(Classification::Skip);
    }

    if is_special_protocol(href) {
        return Ok(Classification::Skip);
    }

    // join() handles both cases: absolute hrefs replace the base entirely,
    // relative ones go through the standard path merging.
    let url = base.join(href).map_err(|source| LinkError::Resolve {
        href: href.to_string(),
        source,
    })?;

    // Something like "ssh://host" or "irc:channel" survives the prefix list
    // but is still not a web page
    if !matches!(url.scheme(), "http" | "https") {
        return Ok(Classification::Skip);
    }

    let internal = url.host_str() == base.host_str();

    Ok(Classification::Resolved { url, internal })
}

// Checks the href against the special protocol list, ignoring ASCII case
// (HREF="MAILTO:..." is as much an email link as the lowercase form)
pub fn is_special_protocol(href: &str) -> bool {
    SPECIAL_PROTOCOLS.iter().any(|protocol| {
        href.get(..protocol.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(protocol))
            .unwrap_or(false)
    })
}
