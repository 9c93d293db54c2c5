// src/store.rs
//! In-memory subscription store. One mutex guards the whole map; callers only
//! ever get clones out, never references into it.

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::probe::types::{MatchKey, MatchResult};
use crate::query::Query;

/// Opaque id of whoever asked for the watch (a chat id, an API caller, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionKey {
    pub subscriber: SubscriberId,
    pub query: String, // normalized
}

impl SubscriptionKey {
    pub fn new(subscriber: SubscriberId, query: &Query) -> Self {
        Self {
            subscriber,
            query: query.normalized().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Retired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub key: SubscriptionKey,
    pub query: Query,
    /// Identities already handed to the delivery channel. Only grows.
    pub delivered: HashSet<MatchKey>,
    /// Sources that produced at least one delivered result.
    pub covered_sources: BTreeSet<String>,
    pub state: SubscriptionState,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Subscription {
    fn new(key: SubscriptionKey, query: Query) -> Self {
        Self {
            key,
            query,
            delivered: HashSet::new(),
            covered_sources: BTreeSet::new(),
            state: SubscriptionState::Active,
            created_at: Utc::now(),
            last_checked: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }

    /// Results not delivered before, in input order, each identity once.
    pub fn fresh(&self, results: &[MatchResult]) -> Vec<MatchResult> {
        let mut batch = HashSet::new();
        results
            .iter()
            .filter(|m| {
                let k = m.key();
                !self.delivered.contains(&k) && batch.insert(k)
            })
            .cloned()
            .collect()
    }

    fn absorb(&mut self, results: &[MatchResult]) {
        for m in results {
            self.delivered.insert(m.key());
            self.covered_sources.insert(m.source.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionStore {
    inner: Mutex<HashMap<SubscriptionKey, Subscription>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live subscription for the key, creating it if needed.
    /// The flag is `true` only when a new one was created.
    pub fn upsert(&self, subscriber: SubscriberId, query: &Query) -> (Subscription, bool) {
        let key = SubscriptionKey::new(subscriber, query);
        let mut map = self.inner.lock();
        if let Some(existing) = map.get(&key) {
            return (existing.clone(), false);
        }
        let sub = Subscription::new(key.clone(), query.clone());
        map.insert(key, sub.clone());
        gauge!("subscriptions_active").set(map.len() as f64);
        (sub, true)
    }

    /// With a query: retire that one watch. Without: retire all of the
    /// subscriber's watches. Returns how many were removed.
    pub fn cancel(&self, subscriber: &SubscriberId, query: Option<&Query>) -> usize {
        let mut map = self.inner.lock();
        let removed = match query {
            Some(q) => {
                let key = SubscriptionKey::new(subscriber.clone(), q);
                usize::from(map.remove(&key).is_some())
            }
            None => {
                let before = map.len();
                map.retain(|k, _| &k.subscriber != subscriber);
                before - map.len()
            }
        };
        gauge!("subscriptions_active").set(map.len() as f64);
        removed
    }

    /// Point-in-time copy of every active subscription, oldest first.
    pub fn snapshot_active(&self) -> Vec<Subscription> {
        let map = self.inner.lock();
        let mut v: Vec<_> = map.values().filter(|s| s.is_active()).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        v
    }

    /// Record results as delivered. Only identities not seen before are
    /// added; those are returned alongside the updated subscription so the
    /// caller notifies about exactly them. Missing key (cancelled meanwhile)
    /// is a no-op and yields `None`.
    pub fn record_delivered(
        &self,
        key: &SubscriptionKey,
        results: &[MatchResult],
    ) -> Option<(Subscription, Vec<MatchResult>)> {
        let mut map = self.inner.lock();
        let sub = map.get_mut(key)?;
        let fresh = sub.fresh(results);
        sub.absorb(&fresh);
        Some((sub.clone(), fresh))
    }

    pub fn mark_checked(&self, key: &SubscriptionKey, at: DateTime<Utc>) {
        if let Some(sub) = self.inner.lock().get_mut(key) {
            sub.last_checked = Some(at);
        }
    }

    /// Remove the subscription and hand back its final state.
    pub fn retire(&self, key: &SubscriptionKey) -> Option<Subscription> {
        let mut map = self.inner.lock();
        let mut sub = map.remove(key)?;
        gauge!("subscriptions_active").set(map.len() as f64);
        sub.state = SubscriptionState::Retired;
        Some(sub)
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<Subscription> {
        self.inner.lock().get(key).cloned()
    }

    pub fn list_for(&self, subscriber: &SubscriberId) -> Vec<Subscription> {
        let map = self.inner.lock();
        let mut v: Vec<_> = map
            .values()
            .filter(|s| &s.key.subscriber == subscriber)
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        v
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Query {
        Query::parse(s).unwrap()
    }

    #[test]
    fn upsert_same_normal_form_is_idempotent() {
        let store = SubscriptionStore::new();
        let (a, new_a) = store.upsert(SubscriberId::from(7i64), &q("Animal"));
        let (b, new_b) = store.upsert(SubscriberId::from(7i64), &q("  ANIMAL "));
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn same_query_different_subscribers_are_separate() {
        let store = SubscriptionStore::new();
        store.upsert(SubscriberId::from(1i64), &q("Animal"));
        store.upsert(SubscriberId::from(2i64), &q("Animal"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn cancel_missing_is_zero() {
        let store = SubscriptionStore::new();
        assert_eq!(store.cancel(&SubscriberId::from(1i64), Some(&q("nothing"))), 0);
        assert_eq!(store.cancel(&SubscriberId::from(1i64), None), 0);
    }

    #[test]
    fn cancel_without_query_removes_all_for_subscriber_only() {
        let store = SubscriptionStore::new();
        store.upsert(SubscriberId::from(1i64), &q("a"));
        store.upsert(SubscriberId::from(1i64), &q("b"));
        store.upsert(SubscriberId::from(2i64), &q("a"));
        assert_eq!(store.cancel(&SubscriberId::from(1i64), None), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list_for(&SubscriberId::from(2i64)).len(), 1);
    }

    #[test]
    fn record_delivered_is_idempotent_and_noop_on_missing_key() {
        let store = SubscriptionStore::new();
        let (sub, _) = store.upsert(SubscriberId::from(1i64), &q("a"));
        let r = MatchResult::new("S", Some("https://s/a".into()), "a");
        let (once, new_once) = store.record_delivered(&sub.key, std::slice::from_ref(&r)).unwrap();
        let (twice, new_twice) = store.record_delivered(&sub.key, std::slice::from_ref(&r)).unwrap();
        assert_eq!(once.delivered.len(), 1);
        assert_eq!(new_once, vec![r.clone()]);
        assert!(new_twice.is_empty());
        assert_eq!(twice.delivered, once.delivered);

        store.retire(&sub.key).unwrap();
        assert!(store.record_delivered(&sub.key, &[r]).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn fresh_skips_delivered_and_batch_duplicates() {
        let store = SubscriptionStore::new();
        let (sub, _) = store.upsert(SubscriberId::from(1i64), &q("a"));
        let old = MatchResult::new("S", Some("https://s/old".into()), "a old");
        let (sub, _) = store.record_delivered(&sub.key, &[old.clone()]).unwrap();
        let new = MatchResult::new("T", Some("https://t/new".into()), "a new");
        let same_url = MatchResult::new("U", Some("https://t/new".into()), "a mirror");
        let fresh = sub.fresh(&[old, new.clone(), same_url]);
        assert_eq!(fresh, vec![new]);
    }

    #[test]
    fn retire_reports_retired_state() {
        let store = SubscriptionStore::new();
        let (sub, _) = store.upsert(SubscriberId::from(1i64), &q("a"));
        let gone = store.retire(&sub.key).unwrap();
        assert_eq!(gone.state, SubscriptionState::Retired);
        assert!(store.retire(&sub.key).is_none());
        assert!(store.snapshot_active().is_empty());
    }
}
