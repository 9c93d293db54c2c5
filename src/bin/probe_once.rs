//! Probe every configured source once for a title and print what was found.
//! Handy for checking source templates: `probe_once The Lion King`.

use anyhow::Context;
use std::sync::Arc;

use movie_notifier::probe::http::HttpProbe;
use movie_notifier::{render_matches, MatchAggregator, Query, WatchConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let raw = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let query = Query::parse(&raw).context("usage: probe_once <movie_name>")?;

    let cfg = WatchConfig::load().context("loading watch configuration")?;
    let probe = HttpProbe::new(cfg.match_mode, cfg.user_agent.as_deref())
        .context("building HTTP client")?;
    let aggregator =
        MatchAggregator::new(Arc::new(probe), cfg.sources.clone(), cfg.per_source_timeout());

    let report = aggregator.probe_all_detailed(&query).await;
    if report.results.is_empty() {
        println!("no matches for '{}'", query.raw());
    } else {
        println!("{}", render_matches(query.raw(), &report.results, false));
    }
    if !report.failed.is_empty() {
        eprintln!("failed sources: {}", report.failed.join(", "));
    }
    Ok(())
}
