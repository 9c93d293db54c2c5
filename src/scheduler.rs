// src/scheduler.rs
//! Periodic re-probe of every active subscription.
//!
//! One shared ticker drives all subscriptions. Each tick snapshots the store,
//! checks every subscription in its own task, delivers only results the
//! subscriber has not seen, and retires subscriptions whose completion policy
//! is met.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::notify::{render_matches, DeliveryChannel};
use crate::policy::CompletionPolicy;
use crate::probe::MatchAggregator;
use crate::store::{Subscription, SubscriptionStore};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;
/// One week. Longer periods are clamped when the ticker starts.
pub const MAX_POLL_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub policy: CompletionPolicy,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            policy: CompletionPolicy::default(),
        }
    }
}

/// What one subscription check did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// New results handed to the channel in this check.
    pub delivered: usize,
    pub retired: bool,
    /// The subscription disappeared (cancelled) while it was being probed.
    pub cancelled: bool,
    pub delivery_failed: bool,
    pub failed_sources: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub notified: usize,
    pub retired: usize,
    pub cancelled: usize,
    pub delivery_failures: usize,
    /// Checks that panicked.
    pub crashed: usize,
}

impl TickReport {
    fn absorb(&mut self, o: CheckOutcome) {
        if o.delivered > 0 {
            self.notified += 1;
        }
        self.retired += usize::from(o.retired);
        self.cancelled += usize::from(o.cancelled);
        self.delivery_failures += usize::from(o.delivery_failed);
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<SubscriptionStore>,
    aggregator: MatchAggregator,
    channel: Arc<dyn DeliveryChannel>,
    cfg: SchedulerCfg,
}

impl Scheduler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        aggregator: MatchAggregator,
        channel: Arc<dyn DeliveryChannel>,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            store,
            aggregator,
            channel,
            cfg,
        }
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn aggregator(&self) -> &MatchAggregator {
        &self.aggregator
    }

    pub fn cfg(&self) -> SchedulerCfg {
        self.cfg
    }

    /// Probe, deliver the delta, re-evaluate the completion policy.
    pub async fn check(&self, sub: Subscription) -> CheckOutcome {
        let key = &sub.key;
        let report = self.aggregator.probe_all_detailed(&sub.query).await;
        let mut outcome = CheckOutcome {
            failed_sources: report.failed.len(),
            ..CheckOutcome::default()
        };
        self.store.mark_checked(key, Utc::now());

        // Bookkeeping happens before the send: a result counts as delivered
        // once handed over, even if the channel then fails.
        let Some((current, fresh)) = self.store.record_delivered(key, &report.results) else {
            tracing::debug!(
                target: "scheduler",
                subscriber = %key.subscriber,
                query = %key.query,
                "subscription cancelled during probe; results discarded"
            );
            outcome.cancelled = true;
            return outcome;
        };

        let finished = self
            .cfg
            .policy
            .is_satisfied(&current, self.aggregator.sources());
        // A concurrent check of the same subscription may have retired it
        // already; whatever `fresh` holds was claimed by this check alone and
        // is still sent.
        if finished && self.store.retire(key).is_some() {
            outcome.retired = true;
            counter!("subscriptions_retired_total", "reason" => "completed").increment(1);
        }

        if !fresh.is_empty() {
            outcome.delivered = fresh.len();
            let text = render_matches(sub.query.raw(), &fresh, finished);
            match self.channel.send(&key.subscriber, &text).await {
                Ok(()) => {
                    counter!("notifications_sent_total").increment(1);
                }
                Err(e) => {
                    outcome.delivery_failed = true;
                    counter!("notification_failures_total").increment(1);
                    tracing::warn!(
                        target: "scheduler",
                        error = %e,
                        channel = self.channel.name(),
                        subscriber = %key.subscriber,
                        query = %key.query,
                        "notification delivery failed"
                    );
                }
            }
        }

        tracing::debug!(
            target: "scheduler",
            subscriber = %key.subscriber,
            query = %key.query,
            new = outcome.delivered,
            total = current.delivered.len(),
            retired = outcome.retired,
            "subscription checked"
        );
        outcome
    }

    /// Check a single subscription in the background (used right after a
    /// watch command so the caller never waits on the probes).
    pub fn spawn_check(&self, sub: Subscription) -> JoinHandle<CheckOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.check(sub).await })
    }

    /// One pass over every active subscription.
    pub async fn tick(&self) -> TickReport {
        let t0 = Instant::now();
        let active = self.store.snapshot_active();
        let mut report = TickReport {
            checked: active.len(),
            ..TickReport::default()
        };

        let mut set = JoinSet::new();
        for sub in active {
            let this = self.clone();
            set.spawn(async move { this.check(sub).await });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    report.crashed += 1;
                    tracing::error!(target: "scheduler", error = %e, "subscription check crashed");
                }
            }
        }

        counter!("scheduler_ticks_total").increment(1);
        histogram!("scheduler_tick_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(
            target: "scheduler",
            checked = report.checked,
            notified = report.notified,
            retired = report.retired,
            crashed = report.crashed,
            "tick"
        );
        report
    }

    /// Run ticks forever on the configured interval. The first tick fires one
    /// interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let max = Duration::from_secs(MAX_POLL_INTERVAL_SECS);
            let period = if self.cfg.interval > max {
                tracing::warn!(
                    target: "scheduler",
                    requested_secs = self.cfg.interval.as_secs(),
                    max_secs = MAX_POLL_INTERVAL_SECS,
                    "poll interval clamped"
                );
                max
            } else {
                self.cfg.interval
            };
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
