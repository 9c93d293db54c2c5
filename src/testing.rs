// src/testing.rs
//! In-process doubles for the two external collaborators, used by the
//! integration tests and handy for local experiments.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{DeliveryError, ProbeError};
use crate::notify::DeliveryChannel;
use crate::probe::types::{MatchResult, SourceDescriptor, SourceProbe};
use crate::query::Query;
use crate::store::SubscriberId;

/// Shorthand for a linked match.
pub fn hit(source: &str, url: &str, text: &str) -> MatchResult {
    MatchResult::new(source, Some(url.to_string()), text)
}

/// Sources named `names`, with placeholder templates.
pub fn sources(names: &[&str]) -> Vec<SourceDescriptor> {
    names
        .iter()
        .map(|n| SourceDescriptor::new(*n, format!("https://{}.example/?s={{query}}", n.to_lowercase())))
        .collect()
}

#[derive(Debug, Clone)]
pub enum Step {
    Found(Vec<MatchResult>),
    /// Answers with the results after a delay.
    Slow(Duration, Vec<MatchResult>),
    Fail,
    /// Never answers within any sane timeout.
    Hang,
    Panic,
}

/// Answers each source's calls from a per-source script, one step per call.
/// An exhausted script answers with no results.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, source: &str, step: Step) -> &Self {
        self.scripts
            .lock()
            .entry(source.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProbe for ScriptedProbe {
    async fn probe(
        &self,
        _query: &Query,
        source: &SourceDescriptor,
        _timeout: Duration,
    ) -> Result<Vec<MatchResult>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .scripts
            .lock()
            .get_mut(&source.name)
            .and_then(|q| q.pop_front());
        match step {
            None => Ok(Vec::new()),
            Some(Step::Found(v)) => Ok(v),
            Some(Step::Slow(delay, v)) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
            Some(Step::Fail) => Err(ProbeError::Status {
                url: source.url_template.clone(),
                status: 503,
            }),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Some(Step::Panic) => panic!("scripted probe panic for {}", source.name),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Keeps every message it is asked to send; can be switched to failing.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(SubscriberId, String)>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every message handed over, including ones that "failed".
    pub fn sent(&self) -> Vec<(SubscriberId, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, to: &SubscriberId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(s, _)| s == to)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().push((to.clone(), text.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Status {
                channel: "recording",
                status: 502,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
