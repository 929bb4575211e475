use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::TARGET_FETCH_CONCURRENCY;
use crate::extract::{extract, Extraction, PriceDate};
use crate::fetcher::PageFetcher;
use crate::providers::{Provider, ScanContext};
use crate::scorer::{Listing, OpportunityScorer};
use crate::types::{Opportunity, WatchTarget};

/// Re-fetches and re-scores a fixed list of curated pages every cycle.
pub struct WatchlistProvider {
    targets: Vec<WatchTarget>,
    fetcher: PageFetcher,
    scorer: Arc<OpportunityScorer>,
}

impl WatchlistProvider {
    pub fn new(targets: Vec<WatchTarget>, fetcher: PageFetcher, scorer: Arc<OpportunityScorer>) -> Self {
        Self { targets, fetcher, scorer }
    }
}

#[async_trait]
impl Provider for WatchlistProvider {
    fn name(&self) -> &'static str {
        "watchlist"
    }

    async fn fetch(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        scan_targets(&self.fetcher, &self.scorer, &self.targets, self.name(), ctx).await
    }
}

/// Fetch → extract → score for each target, preserving target order.
/// A target that fails to fetch, or whose page says nothing is on sale, is
/// skipped for this cycle only.
pub async fn scan_targets(
    fetcher: &PageFetcher,
    scorer: &OpportunityScorer,
    targets: &[WatchTarget],
    source: &str,
    ctx: &ScanContext,
) -> Vec<Opportunity> {
    let pages: Vec<_> = stream::iter(targets.iter().cloned())
        .map(|target| {
            let fetcher = fetcher.clone();
            async move {
                let page = fetcher.fetch(&target.url).await;
                (target, page)
            }
        })
        .buffered(TARGET_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut out = Vec::with_capacity(pages.len());
    let mut skipped = 0usize;
    for (target, page) in pages {
        let body = match page {
            Ok(body) => body,
            Err(e) => {
                warn!(source, url = %target.url, "skipping target this cycle: {e}");
                skipped += 1;
                continue;
            }
        };
        match extract(&body) {
            Extraction::NotTradable => {
                debug!(source, url = %target.url, "page lists no events, skipping");
                skipped += 1;
            }
            Extraction::Listing(pd) => out.push(score_target(scorer, &target, pd, source, ctx)),
        }
    }

    info!(
        source,
        targets = targets.len(),
        listed = out.len(),
        skipped,
        "{source}: {} listings from {} targets ({skipped} skipped)",
        out.len(),
        targets.len(),
    );
    out
}

fn score_target(
    scorer: &OpportunityScorer,
    target: &WatchTarget,
    pd: PriceDate,
    source: &str,
    ctx: &ScanContext,
) -> Opportunity {
    let scores = scorer.score(
        &Listing {
            name: &target.label,
            city: &target.city,
            category: target.category,
            price_min: pd.price_min,
            event_date: pd.date,
            tags: &target.tags,
        },
        ctx.today,
    );
    Opportunity {
        id: target.url.clone(),
        name: target.label.clone(),
        city: target.city.clone(),
        venue: target.venue.clone(),
        date: pd.date_label,
        source: source.to_string(),
        category: target.category,
        price_min: pd.price_min,
        price_max: pd.price_max,
        demand_score: scores.demand,
        risk_score: scores.risk,
        url: Some(target.url.clone()),
        tags: target.tags.clone(),
    }
}
