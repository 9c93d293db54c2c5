// src/policy.rs
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::probe::types::SourceDescriptor;
use crate::store::Subscription;

/// When a subscription has been served enough and should stop being probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionPolicy {
    /// Stop after the first notification that carried anything.
    #[default]
    #[serde(alias = "first_hit")]
    FirstHit,
    /// Keep going until every configured source has contributed a result.
    #[serde(alias = "all_sources")]
    AllSources,
}

impl CompletionPolicy {
    pub fn is_satisfied(&self, sub: &Subscription, sources: &[SourceDescriptor]) -> bool {
        if sub.delivered.is_empty() {
            return false;
        }
        match self {
            CompletionPolicy::FirstHit => true,
            CompletionPolicy::AllSources => sources
                .iter()
                .all(|s| sub.covered_sources.contains(&s.name)),
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flat: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match flat.as_str() {
            "firsthit" => Ok(Self::FirstHit),
            "allsources" => Ok(Self::AllSources),
            _ => Err(format!("unknown completion policy `{s}` (expected firstHit or allSources)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::types::MatchResult;
    use crate::query::Query;
    use crate::store::{SubscriberId, SubscriptionStore};

    fn sources() -> Vec<SourceDescriptor> {
        ["A", "B", "C"]
            .iter()
            .map(|n| SourceDescriptor::new(*n, format!("https://{n}.example/?s={{query}}")))
            .collect()
    }

    #[test]
    fn nothing_delivered_never_satisfies() {
        let store = SubscriptionStore::new();
        let (sub, _) = store.upsert(SubscriberId::from(1i64), &Query::parse("x").unwrap());
        assert!(!CompletionPolicy::FirstHit.is_satisfied(&sub, &sources()));
        assert!(!CompletionPolicy::AllSources.is_satisfied(&sub, &sources()));
    }

    #[test]
    fn first_hit_vs_all_sources() {
        let store = SubscriptionStore::new();
        let (sub, _) = store.upsert(SubscriberId::from(1i64), &Query::parse("x").unwrap());
        let a = MatchResult::new("A", Some("https://A/x".into()), "x");
        let (sub, _) = store.record_delivered(&sub.key, &[a]).unwrap();
        assert!(CompletionPolicy::FirstHit.is_satisfied(&sub, &sources()));
        assert!(!CompletionPolicy::AllSources.is_satisfied(&sub, &sources()));

        let rest = [
            MatchResult::new("B", Some("https://B/x".into()), "x"),
            MatchResult::new("C", None, "x"),
        ];
        let (sub, _) = store.record_delivered(&sub.key, &rest).unwrap();
        assert!(CompletionPolicy::AllSources.is_satisfied(&sub, &sources()));
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!("firstHit".parse::<CompletionPolicy>(), Ok(CompletionPolicy::FirstHit));
        assert_eq!("all_sources".parse::<CompletionPolicy>(), Ok(CompletionPolicy::AllSources));
        assert_eq!("ALL-SOURCES".parse::<CompletionPolicy>(), Ok(CompletionPolicy::AllSources));
        assert!("sometimes".parse::<CompletionPolicy>().is_err());
    }
}
