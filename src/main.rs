//! movie-notifier — binary entrypoint.
//! Loads configuration, starts the scheduler, the Telegram long-poll (when a
//! bot token is set) and the HTTP server for commands, health and metrics.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use movie_notifier::api::{self, AppState};
use movie_notifier::bot::BotTransport;
use movie_notifier::metrics::Metrics;
use movie_notifier::notify::{select_channel, telegram::TelegramChannel};
use movie_notifier::probe::http::HttpProbe;
use movie_notifier::{
    CommandRouter, MatchAggregator, RuntimeSettings, Scheduler, SubscriptionStore, WatchConfig,
    Watcher,
};

// Events carry explicit targets (`scheduler`, `probe`, ...), so the filter
// names those rather than the crate path.
const DEFAULT_LOG_FILTER: &str =
    "movie_notifier=info,scheduler=info,commands=info,bot=info,notify=info,config=info,probe=warn,warn";

/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = WatchConfig::load().context("loading watch configuration")?;
    let settings = RuntimeSettings::from_env().context("reading process settings")?;
    let metrics = Metrics::init()?;

    let probe = HttpProbe::new(cfg.match_mode, cfg.user_agent.as_deref())
        .context("building HTTP client")?;
    let match_mode = probe.mode();
    let aggregator =
        MatchAggregator::new(Arc::new(probe), cfg.sources.clone(), cfg.per_source_timeout());
    let store = Arc::new(SubscriptionStore::new());
    let channel = select_channel(
        settings.bot_token.as_deref(),
        settings.webhook_url.as_deref(),
        cfg.delivery_timeout_seconds,
        cfg.delivery_retries,
    );
    let channel_name = channel.name();

    let scheduler = Scheduler::new(store, aggregator, channel, cfg.scheduler_cfg());
    let sched_cfg = scheduler.cfg();
    let per_source_timeout = scheduler.aggregator().per_source_timeout();
    let ticker = scheduler.clone().spawn();

    let watcher = Arc::new(Watcher::new(scheduler, cfg.probe_on_watch));
    let bot = settings.bot_token.as_deref().map(|token| {
        let api = TelegramChannel::new(token)
            .with_timeout(cfg.delivery_timeout_seconds)
            .with_retries(cfg.delivery_retries);
        BotTransport::new(api, CommandRouter::new(watcher.clone())).spawn()
    });

    let app = api::router(AppState { watcher }).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("binding port {}", settings.port))?;

    tracing::info!(
        port = settings.port,
        sources = cfg.sources.len(),
        interval = ?sched_cfg.interval,
        policy = ?sched_cfg.policy,
        per_source_timeout = ?per_source_timeout,
        match_mode = ?match_mode,
        channel = channel_name,
        telegram = bot.is_some(),
        "movie-notifier started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    ticker.abort();
    if let Some(bot) = bot {
        bot.abort();
    }
    tracing::info!("movie-notifier stopped");
    Ok(())
}
