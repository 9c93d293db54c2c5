// src/probe/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ProbeError;
use crate::query::Query;

/// Replaced by the URL-encoded query text in a source's template.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Static description of one probed site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(alias = "url_template")]
    pub url_template: String,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
        }
    }

    /// Concrete URL to fetch for `query`. Templates without the placeholder
    /// are fetched verbatim.
    pub fn search_url(&self, query: &Query) -> Result<Url, ProbeError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.raw().as_bytes()).collect();
        let raw = self.url_template.replace(QUERY_PLACEHOLDER, &encoded);
        Url::parse(&raw).map_err(|e| ProbeError::InvalidUrl {
            source_name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// One occurrence of a query at a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    pub source: String, // SourceDescriptor::name
    pub url: Option<String>,
    pub text: String, // cleaned display text
}

impl MatchResult {
    pub fn new(source: impl Into<String>, url: Option<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url,
            text: text.into(),
        }
    }

    /// Identity used for "already delivered" checks.
    pub fn key(&self) -> MatchKey {
        match &self.url {
            Some(u) if !u.trim().is_empty() => MatchKey::Url(u.trim().to_string()),
            _ => MatchKey::Text {
                source: self.source.clone(),
                text: self.text.clone(),
            },
        }
    }
}

/// Dedup identity of a [`MatchResult`]: its URL, or `(source, text)` when
/// there is no link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MatchKey {
    Url(String),
    Text { source: String, text: String },
}

#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// Must not panic on network or markup problems; those map to `ProbeError`.
    async fn probe(
        &self,
        query: &Query,
        source: &SourceDescriptor,
        timeout: Duration,
    ) -> Result<Vec<MatchResult>, ProbeError>;

    fn name(&self) -> &'static str;
}
