// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only one recorder may exist per
    /// process, so call this once from the binary.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metric descriptions (so series show up on /metrics with help text).
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("probe_requests_total", "Source search pages fetched.");
        describe_counter!("probe_errors_total", "Source probes that failed or timed out.");
        describe_histogram!("probe_fetch_ms", "Source fetch + parse time in milliseconds.");
        describe_counter!("notifications_sent_total", "Batched notifications delivered.");
        describe_counter!(
            "notification_failures_total",
            "Notifications the delivery channel rejected."
        );
        describe_counter!(
            "subscriptions_retired_total",
            "Subscriptions retired by their completion policy."
        );
        describe_counter!("scheduler_ticks_total", "Scheduler ticks run.");
        describe_histogram!("scheduler_tick_ms", "Scheduler tick duration in milliseconds.");
        describe_gauge!("subscriptions_active", "Subscriptions currently being watched.");
    });
}
