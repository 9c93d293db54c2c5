// src/probe/mod.rs
pub mod http;
pub mod types;

use futures::future::join_all;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProbeError;
use crate::probe::types::{MatchResult, SourceDescriptor, SourceProbe};
use crate::query::Query;

/// Outcome of one fan-out over all sources.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Concatenated in configured source order.
    pub results: Vec<MatchResult>,
    /// Names of sources that failed or timed out this round.
    pub failed: Vec<String>,
}

/// Probes every configured source for a query and merges the answers.
/// A failing source only costs its own results.
#[derive(Clone)]
pub struct MatchAggregator {
    probe: Arc<dyn SourceProbe>,
    sources: Arc<[SourceDescriptor]>,
    timeout: Duration,
}

impl MatchAggregator {
    pub fn new(
        probe: Arc<dyn SourceProbe>,
        sources: Vec<SourceDescriptor>,
        per_source_timeout: Duration,
    ) -> Self {
        Self {
            probe,
            sources: sources.into(),
            timeout: per_source_timeout,
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn per_source_timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn probe_all(&self, query: &Query) -> Vec<MatchResult> {
        self.probe_all_detailed(query).await.results
    }

    pub async fn probe_all_detailed(&self, query: &Query) -> ProbeReport {
        let calls = self.sources.iter().map(|s| self.probe_one(query, s));
        // join_all keeps input order, which gives the stable source order.
        let answers = join_all(calls).await;

        let mut report = ProbeReport::default();
        for (source, answer) in self.sources.iter().zip(answers) {
            match answer {
                Ok(found) => report.results.extend(dedupe_by_url(found)),
                Err(e) => {
                    tracing::warn!(
                        target: "probe",
                        error = %e,
                        probe = self.probe.name(),
                        source = %source.name,
                        query = query.normalized(),
                        "source probe failed"
                    );
                    counter!("probe_errors_total", "source" => source.name.clone()).increment(1);
                    report.failed.push(source.name.clone());
                }
            }
        }
        report
    }

    async fn probe_one(
        &self,
        query: &Query,
        source: &SourceDescriptor,
    ) -> Result<Vec<MatchResult>, ProbeError> {
        // The probe gets the budget too, but the outer timeout is what bounds us.
        match tokio::time::timeout(self.timeout, self.probe.probe(query, source, self.timeout)).await
        {
            Ok(res) => res,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

fn dedupe_by_url(found: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|m| match &m.url {
            Some(u) => seen.insert(u.clone()),
            None => true,
        })
        .collect()
}
