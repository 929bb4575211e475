use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{DiscoveryPage, UNKNOWN_CITY, UNKNOWN_VENUE};
use crate::fetcher::PageFetcher;
use crate::providers::watchlist::scan_targets;
use crate::providers::{Provider, ScanContext};
use crate::scorer::OpportunityScorer;
use crate::types::{Opportunity, WatchTarget};

/// Path segments that lead to an event or performer detail page.
pub const DETAIL_SEGMENTS: &[&str] = &[
    "/event/",
    "/events/",
    "/festivals/",
    "/artist/",
    "/performer/",
    "/tickets/",
];

pub const DISCOVERED_TAG: &str = "discovered";

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLink {
    pub url: String,
    pub label: String,
}

struct DiscoveryCache {
    targets: Arc<Vec<WatchTarget>>,
    refreshed_at: Option<Instant>,
}

/// Crawls category listing pages for new watch targets, then scans them like
/// the curated watchlist.
///
/// The discovered set is replaced wholesale on every successful refresh and
/// never contains a curated URL. Refreshes happen on their own interval; a
/// scan that finds the cache older than that interval refreshes first.
pub struct DiscoveryProvider {
    pages: Vec<DiscoveryPage>,
    curated: HashSet<String>,
    max_per_page: usize,
    interval: Duration,
    fetcher: PageFetcher,
    scorer: Arc<OpportunityScorer>,
    cache: Mutex<DiscoveryCache>,
}

impl DiscoveryProvider {
    pub fn new(
        pages: Vec<DiscoveryPage>,
        curated: &[WatchTarget],
        max_per_page: usize,
        interval: Duration,
        fetcher: PageFetcher,
        scorer: Arc<OpportunityScorer>,
    ) -> Self {
        let curated = curated
            .iter()
            .map(|t| normalize_url(&t.url).unwrap_or_else(|| t.url.clone()))
            .collect();
        Self {
            pages,
            curated,
            max_per_page,
            interval,
            fetcher,
            scorer,
            cache: Mutex::new(DiscoveryCache { targets: Arc::new(Vec::new()), refreshed_at: None }),
        }
    }

    /// Re-crawl now regardless of cache age. Returns the size of the new set.
    pub async fn refresh(&self) -> usize {
        let mut cache = self.cache.lock().await;
        self.refresh_locked(&mut cache).await;
        cache.targets.len()
    }

    /// Refresh loop for the dedicated discovery timer.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let stale = {
                let cache = self.cache.lock().await;
                self.is_stale(&cache)
            };
            // The scan path may already have refreshed this interval.
            if stale {
                self.refresh().await;
            }
        }
    }

    pub async fn current_targets(&self) -> Arc<Vec<WatchTarget>> {
        let mut cache = self.cache.lock().await;
        if self.is_stale(&cache) {
            self.refresh_locked(&mut cache).await;
        }
        Arc::clone(&cache.targets)
    }

    fn is_stale(&self, cache: &DiscoveryCache) -> bool {
        cache
            .refreshed_at
            .map_or(true, |at| at.elapsed() >= self.interval)
    }

    async fn refresh_locked(&self, cache: &mut DiscoveryCache) {
        // Failed crawls still count as a refresh so a dead listing site is not
        // hammered on every scan.
        cache.refreshed_at = Some(Instant::now());
        match self.crawl().await {
            Some(found) => {
                let previous = cache.targets.len();
                cache.targets = Arc::new(found);
                info!(
                    discovered = cache.targets.len(),
                    previous,
                    "Discovery refresh complete: {} targets (was {previous})",
                    cache.targets.len(),
                );
            }
            None => {
                error!(
                    kept = cache.targets.len(),
                    "Discovery refresh failed on every page, keeping previous set"
                );
            }
        }
    }

    /// `None` when every configured page failed to fetch.
    async fn crawl(&self) -> Option<Vec<WatchTarget>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut found = Vec::new();
        let mut pages_ok = 0usize;

        for page in &self.pages {
            let body = match self.fetcher.fetch(&page.url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %page.url, "discovery page fetch failed: {e}");
                    continue;
                }
            };
            pages_ok += 1;

            let mut added = 0usize;
            for link in extract_detail_links(&body, &page.url) {
                if added >= self.max_per_page {
                    break;
                }
                if self.curated.contains(&link.url) || !seen.insert(link.url.clone()) {
                    continue;
                }
                found.push(WatchTarget {
                    url: link.url,
                    label: link.label,
                    city: UNKNOWN_CITY.to_string(),
                    venue: UNKNOWN_VENUE.to_string(),
                    category: page.category,
                    tags: vec![DISCOVERED_TAG.to_string()],
                });
                added += 1;
            }
        }

        if pages_ok == 0 && !self.pages.is_empty() {
            None
        } else {
            Some(found)
        }
    }
}

#[async_trait]
impl Provider for DiscoveryProvider {
    fn name(&self) -> &'static str {
        "discovery"
    }

    async fn fetch(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        let targets = self.current_targets().await;
        scan_targets(&self.fetcher, &self.scorer, &targets, self.name(), ctx).await
    }
}

/// Links on a listing page that point at event or performer detail pages,
/// resolved against `base`, in page order, without duplicates.
pub fn extract_detail_links(html: &str, base: &str) -> Vec<DetailLink> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let base_norm = normalize_url(base);
    let doc = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for a in doc.select(&ANCHORS) {
        let Some(href) = a.value().attr("href") else { continue };
        let Ok(mut url) = base_url.join(href.trim()) else { continue };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        url.set_fragment(None);
        if !is_detail_path(url.path()) {
            continue;
        }
        let resolved = url.to_string();
        if Some(&resolved) == base_norm.as_ref() || !seen.insert(resolved.clone()) {
            continue;
        }
        let text = a.text().collect::<Vec<_>>().join(" ");
        let label = collapse_whitespace(&text);
        let label = if label.is_empty() { label_from_path(url.path()) } else { label };
        links.push(DetailLink { url: resolved, label });
    }
    links
}

fn is_detail_path(path: &str) -> bool {
    DETAIL_SEGMENTS.iter().any(|seg| {
        path.find(seg)
            .map(|i| !path[i + seg.len()..].trim_matches('/').is_empty())
            .unwrap_or(false)
    })
}

fn label_from_path(path: &str) -> String {
    path.trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .replace(['-', '_'], " ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}
