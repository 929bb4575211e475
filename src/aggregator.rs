use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::providers::{Provider, ScanContext};
use crate::types::ScanResult;

/// Run every provider concurrently, concatenate in provider order, rank.
/// Providers absorb their own failures, so this never fails; no providers
/// (or all empty) gives an empty result.
pub async fn aggregate(providers: &[Arc<dyn Provider>], ctx: &ScanContext) -> ScanResult {
    let batches = join_all(providers.iter().map(|p| p.fetch(ctx))).await;

    let mut all = Vec::with_capacity(batches.iter().map(Vec::len).sum());
    for (provider, batch) in providers.iter().zip(batches) {
        debug!(provider = provider.name(), count = batch.len(), "provider batch");
        all.extend(batch);
    }

    let result = ScanResult::rank(all);
    info!(
        providers = providers.len(),
        evaluated = result.len(),
        "Aggregated {} opportunities from {} providers",
        result.len(),
        providers.len(),
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::config::Rosters;
    use crate::fetcher::{PageFetcher, RetryPolicy};
    use crate::providers::WatchlistProvider;
    use crate::scorer::OpportunityScorer;
    use crate::testkit::{
        opportunity, status, transport_err, EmptyProvider, FixedProvider, RecordingSleeper, ScriptedHttp,
    };
    use crate::types::{Category, Opportunity, WatchTarget};

    fn ctx() -> ScanContext {
        ScanContext { today: NaiveDate::from_ymd_opt(2031, 6, 1).unwrap() }
    }

    fn ids(result: &ScanResult) -> Vec<&str> {
        result.iter().map(|o| o.id.as_str()).collect()
    }

    #[tokio::test]
    async fn concatenates_and_ranks_across_providers() {
        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(FixedProvider { name: "a", items: vec![opportunity("a90", 90.0), opportunity("a40", 40.0)] }),
            Arc::new(FixedProvider { name: "b", items: vec![opportunity("b75", 75.0), opportunity("b10", 10.0)] }),
        ];
        let result = aggregate(&providers, &ctx()).await;
        assert_eq!(ids(&result), vec!["a90", "b75", "a40", "b10"]);
    }

    #[tokio::test]
    async fn broken_provider_does_not_affect_others() {
        let items = vec![opportunity("x", 50.0), opportunity("y", 50.0), opportunity("z", 60.0)];
        let healthy: Vec<Arc<dyn Provider>> =
            vec![Arc::new(FixedProvider { name: "ok", items: items.clone() })];
        let with_broken: Vec<Arc<dyn Provider>> = vec![
            Arc::new(EmptyProvider),
            Arc::new(FixedProvider { name: "ok", items }),
            Arc::new(EmptyProvider),
        ];

        let alone = aggregate(&healthy, &ctx()).await;
        let mixed = aggregate(&with_broken, &ctx()).await;
        assert_eq!(ids(&alone), ids(&mixed));
        assert_eq!(ids(&mixed), vec!["z", "x", "y"]);
    }

    #[tokio::test]
    async fn failing_adapter_leaves_other_results_intact() {
        let http = Arc::new(ScriptedHttp::routes(vec![
            ("https://t/down", status(500)),
            ("https://t/flaky", transport_err("connection reset")),
        ]));
        let fetcher = PageFetcher::new(http.clone(), Arc::new(RecordingSleeper::default()), RetryPolicy::default());
        let targets = ["https://t/down", "https://t/flaky"]
            .iter()
            .map(|url| WatchTarget {
                url: url.to_string(),
                label: "Gig".to_string(),
                city: "Leeds".to_string(),
                venue: "Arena".to_string(),
                category: Category::Generic,
                tags: Vec::new(),
            })
            .collect();
        let scorer = Arc::new(OpportunityScorer::new(Rosters::default(), Vec::new()));
        let failing: Arc<dyn Provider> = Arc::new(WatchlistProvider::new(targets, fetcher, scorer));
        let items = vec![opportunity("x", 50.0), opportunity("y", 50.0), opportunity("z", 60.0)];
        let fixed: Arc<dyn Provider> = Arc::new(FixedProvider { name: "ok", items });

        let alone = aggregate(&[fixed.clone()], &ctx()).await;
        let mixed = aggregate(&[failing, fixed], &ctx()).await;
        assert_eq!(ids(&mixed), ids(&alone));
        assert_eq!(ids(&mixed), vec!["z", "x", "y"]);
        // both targets were actually tried, with retries
        assert!(http.calls() > 2);
    }

    #[tokio::test]
    async fn equal_scores_keep_provider_order() {
        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(FixedProvider { name: "first", items: vec![opportunity("f1", 70.0)] }),
            Arc::new(FixedProvider { name: "second", items: vec![opportunity("s1", 70.0), opportunity("s2", 70.0)] }),
        ];
        let result = aggregate(&providers, &ctx()).await;
        assert_eq!(ids(&result), vec!["f1", "s1", "s2"]);
        let scores: Vec<f64> = result.iter().map(Opportunity::trade_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn no_providers_is_empty() {
        assert!(aggregate(&[], &ctx()).await.is_empty());
        let empties: Vec<Arc<dyn Provider>> = vec![Arc::new(EmptyProvider)];
        assert!(aggregate(&empties, &ctx()).await.is_empty());
    }
}
