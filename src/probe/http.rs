// src/probe/http.rs
//! HTML search-page probe. Fetches a source's search URL and pulls out the
//! links whose visible text contains the query.

use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::ProbeError;
use crate::probe::types::{MatchResult, SourceDescriptor, SourceProbe};
use crate::query::{clean_text, Query};

pub const DEFAULT_USER_AGENT: &str = concat!("movie-notifier/", env!("CARGO_PKG_VERSION"));

/// What counts as "found" on a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Link text contains the query; one result per matching link.
    #[default]
    Anchor,
    /// Anywhere in the page text; at most one result pointing at the page.
    Page,
}

fn re_anchor() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a\s*>"#,
        )
        .expect("anchor regex")
    })
}

fn re_noise() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").expect("noise regex"))
}

/// Pure extraction step, separated from the fetch so it can be tested on
/// fixtures.
pub fn extract_matches(
    html: &str,
    page_url: &Url,
    query: &Query,
    source: &str,
    mode: MatchMode,
) -> Vec<MatchResult> {
    let html = re_noise().replace_all(html, " ");
    match mode {
        MatchMode::Page => {
            if query.is_found_in(&clean_text_unbounded(&html)) {
                vec![MatchResult::new(
                    source,
                    Some(page_url.to_string()),
                    query.raw(),
                )]
            } else {
                Vec::new()
            }
        }
        MatchMode::Anchor => {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for cap in re_anchor().captures_iter(&html) {
                let href = cap
                    .get(1)
                    .or_else(|| cap.get(2))
                    .or_else(|| cap.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let text = clean_text(cap.get(4).map(|m| m.as_str()).unwrap_or_default());
                if text.is_empty() || !query.is_found_in(&text) {
                    continue;
                }
                let Some(link) = resolve_link(page_url, href) else {
                    continue;
                };
                if seen.insert(link.clone()) {
                    out.push(MatchResult::new(source, Some(link), text));
                }
            }
            out
        }
    }
}

fn clean_text_unbounded(html: &str) -> String {
    // clean_text caps length for display; page mode needs the whole body.
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re = RE_TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));
    let stripped = re.replace_all(html, " ");
    html_escape::decode_html_entities(&stripped).to_string()
}

fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = html_escape::decode_html_entities(href.trim()).to_string();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") {
        return None;
    }
    let abs = base.join(&href).ok()?;
    matches!(abs.scheme(), "http" | "https").then(|| abs.to_string())
}

pub struct HttpProbe {
    client: reqwest::Client,
    mode: MatchMode,
}

impl HttpProbe {
    pub fn new(mode: MatchMode, user_agent: Option<&str>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()?;
        Ok(Self { client, mode })
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }
}

#[async_trait]
impl SourceProbe for HttpProbe {
    async fn probe(
        &self,
        query: &Query,
        source: &SourceDescriptor,
        timeout: Duration,
    ) -> Result<Vec<MatchResult>, ProbeError> {
        let url = source.search_url(query)?;
        let t0 = Instant::now();
        counter!("probe_requests_total", "source" => source.name.clone()).increment(1);

        let resp = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Request {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Redirects change the base for relative links.
        let page_url = resp.url().clone();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Body(e.to_string())
            }
        })?;

        let out = extract_matches(&body, &page_url, query, &source.name, self.mode);
        histogram!("probe_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(
            target: "probe",
            source = %source.name,
            query = query.normalized(),
            matches = out.len(),
            "probe finished"
        );
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><head><script>var s = "<a href='/x'>Animal</a>";</script></head>
        <body>
          <a href="/movies/animal-2023/">Animal (2023) Hindi&nbsp;WEB-DL</a>
          <a class="thumb" href='https://cdn.example.org/animal-2023/'><b>ANIMAL</b> 1080p</a>
          <a href="/movies/animal-2023/">Animal (2023) duplicate link</a>
          <a href="/movies/jawan/">Jawan (2023)</a>
          <a href="#top">Animal</a>
          <a href="javascript:void(0)">Animal</a>
        </body></html>"##;

    fn base() -> Url {
        Url::parse("https://site.example.com/search?q=animal").unwrap()
    }

    #[test]
    fn anchor_mode_resolves_and_dedupes_links() {
        let q = Query::parse("animal").unwrap();
        let got = extract_matches(PAGE, &base(), &q, "Site", MatchMode::Anchor);
        let urls: Vec<_> = got.iter().map(|m| m.url.clone().unwrap()).collect();
        assert_eq!(
            urls,
            vec![
                "https://site.example.com/movies/animal-2023/".to_string(),
                "https://cdn.example.org/animal-2023/".to_string(),
            ]
        );
        assert_eq!(got[0].text, "Animal (2023) Hindi WEB-DL");
        assert!(got.iter().all(|m| m.source == "Site"));
    }

    #[test]
    fn anchor_mode_ignores_non_matching_links() {
        let q = Query::parse("Oppenheimer").unwrap();
        assert!(extract_matches(PAGE, &base(), &q, "Site", MatchMode::Anchor).is_empty());
    }

    #[test]
    fn page_mode_reports_the_page_once() {
        let q = Query::parse("jawan").unwrap();
        let got = extract_matches(PAGE, &base(), &q, "Site", MatchMode::Page);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].url.as_deref(), Some("https://site.example.com/search?q=animal"));
        assert_eq!(got[0].text, "jawan");
    }

    #[test]
    fn script_bodies_do_not_count() {
        let html = r#"<script>document.write("<a href='/a'>Dunki</a>")</script>"#;
        let q = Query::parse("dunki").unwrap();
        assert!(extract_matches(html, &base(), &q, "Site", MatchMode::Anchor).is_empty());
        assert!(extract_matches(html, &base(), &q, "Site", MatchMode::Page).is_empty());
    }

    #[test]
    fn probe_reports_its_mode_and_name() {
        let probe = HttpProbe::new(MatchMode::Page, Some("test-agent")).unwrap();
        assert_eq!(probe.mode(), MatchMode::Page);
        assert_eq!(probe.name(), "http");
    }

    #[test]
    fn search_url_encodes_the_query() {
        let src = SourceDescriptor::new("Site", "https://site.example.com/?s={query}");
        let q = Query::parse("The Lion King").unwrap();
        assert_eq!(
            src.search_url(&q).unwrap().as_str(),
            "https://site.example.com/?s=The+Lion+King"
        );
    }
}
