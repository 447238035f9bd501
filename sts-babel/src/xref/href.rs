//! Encoded cross-document hrefs.
//!
//! Cross-document links carry the target element id inside an XPath-like
//! predicate, e.g. `ISO-9999.xml#xpointer(//*[@id='sec_2'])` or
//! `ISO-9999.xml#xpointer(id('sec_2'))`.

use once_cell::sync::Lazy;
use regex::Regex;

static ID_PREDICATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[@id\s*=\s*['"]([^'"]+)['"]\]|id\(\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("id predicate pattern is valid")
});

/// A decoded href: the referenced document (if the href names one) and the
/// embedded element id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHref<'a> {
    pub document: Option<String>,
    pub element_id: &'a str,
}

/// Extract the element id embedded in an href predicate.
pub fn element_id(href: &str) -> Option<&str> {
    let captures = ID_PREDICATE.captures(href)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
}

/// Split an encoded href into document reference and element id.
pub fn decode(href: &str) -> Option<EncodedHref<'_>> {
    let element_id = element_id(href)?;
    let document = href
        .split_once('#')
        .map(|(document, _)| document)
        .and_then(document_key);
    Some(EncodedHref {
        document,
        element_id,
    })
}

/// Normalise a document reference (`dir/ISO-9999.xml`) to a registry key
/// (`ISO-9999`). Returns `None` for an empty reference.
pub fn document_key(reference: &str) -> Option<String> {
    let reference = reference.trim();
    let file = reference.rsplit(['/', '\\']).next().unwrap_or(reference);
    let key = file.strip_suffix(".xml").unwrap_or(file);
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
