// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod policy;
pub mod probe;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::commands::{CommandRouter, WatchOutcome, Watcher};
pub use crate::config::{RuntimeSettings, WatchConfig};
pub use crate::error::{ConfigError, DeliveryError, ProbeError};
pub use crate::notify::{render_matches, DeliveryChannel};
pub use crate::policy::CompletionPolicy;
pub use crate::probe::types::{MatchKey, MatchResult, SourceDescriptor, SourceProbe};
pub use crate::probe::MatchAggregator;
pub use crate::query::Query;
pub use crate::scheduler::{Scheduler, SchedulerCfg, TickReport};
pub use crate::store::{SubscriberId, Subscription, SubscriptionKey, SubscriptionStore};
