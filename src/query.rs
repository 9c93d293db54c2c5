// src/query.rs
//! Query normalization and the text cleanup shared with the HTML probe.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::fmt;

// Display text is capped so a pathological anchor can't blow up a message.
const MAX_TEXT_CHARS: usize = 300;

fn re_ws() -> &'static Regex {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn re_tags() -> &'static Regex {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"))
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_ws(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Case-fold and collapse whitespace. Two strings with the same normal form
/// name the same watch.
pub fn normalize_query(s: &str) -> String {
    collapse_ws(&s.to_lowercase())
}

/// Turn an HTML fragment into display text: strip tags, decode entities,
/// normalize typographic quotes, collapse whitespace, cap the length.
pub fn clean_text(s: &str) -> String {
    let stripped = re_tags().replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&stripped).to_string();
    let quoted = decoded
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");
    let mut out = collapse_ws(&quoted);
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// A watched search term: the text as the subscriber typed it plus its
/// normalized identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Query {
    raw: String,
    normalized: String,
}

impl Query {
    /// Returns `None` when nothing is left after normalization.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_query(raw);
        if normalized.is_empty() {
            return None;
        }
        Some(Self {
            raw: collapse_ws(raw),
            normalized,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Case-insensitive, whitespace-insensitive containment.
    pub fn is_found_in(&self, haystack: &str) -> bool {
        normalize_query(haystack).contains(&self.normalized)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize_query("  The   Lion\tKING "), "the lion king");
    }

    #[test]
    fn equal_normal_forms_are_equal_queries() {
        let a = Query::parse("Animal").unwrap();
        let b = Query::parse("  aNIMAL  ").unwrap();
        assert_eq!(a.normalized(), b.normalized());
        assert_eq!(b.raw(), "aNIMAL");
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(Query::parse("   \n\t").is_none());
        assert!(Query::parse("").is_none());
    }

    #[test]
    fn clean_text_strips_tags_and_entities() {
        let out = clean_text("<b>Animal</b>&nbsp;(2023)&nbsp;&amp; more\n  HD");
        assert_eq!(out, "Animal (2023) & more HD");
    }

    #[test]
    fn found_in_ignores_case_and_spacing() {
        let q = Query::parse("lion king").unwrap();
        assert!(q.is_found_in("Watch The  LION\nKing (1994)"));
        assert!(!q.is_found_in("Lion Heart"));
    }
}
