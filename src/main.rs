mod aggregator;
mod alerts;
mod api;
mod config;
mod error;
mod extract;
mod fetcher;
mod format;
mod notifier;
mod providers;
mod scan_loop;
mod scorer;
mod state;
mod types;

#[cfg(test)]
mod testkit;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::error::Result;
use crate::fetcher::{HttpGet, PageFetcher, ReqwestHttp, TokioSleeper};
use crate::notifier::{LogNotifier, Notifier, TelegramNotifier};
use crate::providers::{DiscoveryProvider, Provider, TicketmasterProvider, WatchlistProvider};
use crate::scan_loop::{ScanEngine, ScanLoop, ScanSettings, Shared};
use crate::scorer::OpportunityScorer;
use crate::state::Subscribers;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Outbound HTTP ---
    let http: Arc<dyn HttpGet> = Arc::new(ReqwestHttp::new(cfg.http_timeout)?);
    let fetcher = PageFetcher::new(Arc::clone(&http), Arc::new(TokioSleeper), cfg.retry.clone());
    let scorer = Arc::new(OpportunityScorer::new(cfg.rosters.clone(), cfg.cities_of_interest.clone()));

    // --- Providers ---
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    if cfg.enable_ticketmaster {
        match TicketmasterProvider::from_config(&cfg, Arc::clone(&http), Arc::clone(&scorer)) {
            Some(p) => providers.push(Arc::new(p)),
            None => warn!("TICKETMASTER_API_KEY not set, Ticketmaster provider disabled"),
        }
    }

    if cfg.enable_watchlist {
        info!("Watchlist: {} curated targets", cfg.watchlist.len());
        providers.push(Arc::new(WatchlistProvider::new(
            cfg.watchlist.clone(),
            fetcher.clone(),
            Arc::clone(&scorer),
        )));
    }

    if cfg.enable_discovery {
        let discovery = Arc::new(DiscoveryProvider::new(
            cfg.discovery_pages.clone(),
            &cfg.watchlist,
            cfg.discovery_max_per_page,
            cfg.discovery_interval,
            fetcher.clone(),
            Arc::clone(&scorer),
        ));
        providers.push(discovery.clone());

        // Discovery refresher (background, every DISCOVERY_INTERVAL_SECS)
        tokio::spawn(async move { discovery.run().await });
    }

    let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    if providers.is_empty() {
        warn!("No providers enabled, scans will always be empty");
    } else {
        info!("Providers enabled: {}", names.join(", "));
    }

    // --- Alert delivery ---
    let notifier: Arc<dyn Notifier> = match &cfg.telegram_bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(token, cfg.http_timeout)?),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let subscribers = Subscribers::new(&cfg.subscriber_ids);
    if subscribers.is_empty() {
        info!("No subscribers yet; timer scans wait until one registers");
    }

    // --- Scan loop ---
    let (manual_tx, manual_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let engine = ScanEngine::new(
        providers,
        notifier,
        Shared::new(subscribers),
        ScanSettings::from_config(&cfg),
    );
    let shared = engine.shared().clone();
    tokio::spawn(async move { ScanLoop::new(engine, manual_rx).run().await });
    info!(
        "Scan loop started: every {}s, threshold {:.1}, max {} alerts/cycle, manual scans {:?}",
        cfg.scan_interval.as_secs(),
        cfg.alert_threshold,
        cfg.max_alerts_per_cycle,
        cfg.manual_scan_policy,
    );

    // HTTP API server
    let app = router(ApiState { shared, manual_tx, summary_top_n: cfg.summary_top_n });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
