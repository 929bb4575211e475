use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::api::health::Phase;
use crate::error::AppError;
use crate::format::{render_summary, render_watchlist};
use crate::scan_loop::{CycleReport, ManualScan, Shared};
use crate::state::WatchKind;
use crate::types::{Category, Opportunity, ScanMetadata, SubscriberId};

#[derive(Clone)]
pub struct ApiState {
    pub shared: Shared,
    pub manual_tx: mpsc::Sender<ManualScan>,
    pub summary_top_n: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/scan", post(post_scan))
        .route("/scan/summary", get(get_scan_summary))
        .route("/opportunities", get(get_opportunities))
        .route("/subscribers", get(get_subscribers))
        .route("/subscribers/:id", post(add_subscriber).delete(remove_subscriber))
        .route("/subscribers/:id/artists", post(add_artist))
        .route("/subscribers/:id/cities", post(add_city))
        .route("/subscribers/:id/watch", get(get_watch))
        .route("/subscribers/:id/opportunities", get(get_personal_opportunities))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OpportunitiesQuery {
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct WatchEntry {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: Phase,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_scan_at: Option<u64>,
    pub last_error: Option<String>,
    pub subscribers: usize,
    pub alerted: usize,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub text: String,
    pub metadata: Option<ScanMetadata>,
}

#[derive(Serialize)]
pub struct OpportunityResponse {
    pub id: String,
    pub name: String,
    pub city: String,
    pub venue: String,
    pub date: String,
    pub source: String,
    pub category: Category,
    pub price_min: f64,
    pub price_max: f64,
    pub demand_score: f64,
    pub risk_score: f64,
    pub margin_estimate: f64,
    pub trade_score: f64,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub alerted: bool,
}

#[derive(Serialize)]
pub struct WatchResponse {
    pub artists: Vec<String>,
    pub cities: Vec<String>,
    pub text: String,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let health = &state.shared.health;
    let last_scan_at = Some(health.last_scan_at()).filter(|t| *t > 0);
    Json(HealthResponse {
        status: "ok",
        phase: health.phase(),
        cycles_ok: health.cycles_ok(),
        cycles_failed: health.cycles_failed(),
        last_scan_at,
        last_error: health.last_error(),
        subscribers: state.shared.subscribers.len(),
        alerted: state.shared.state.alerted_count(),
    })
}

async fn post_scan(State(state): State<ApiState>) -> Result<Json<CycleReport>, AppError> {
    let (reply, rx) = oneshot::channel();
    state
        .manual_tx
        .send(ManualScan { reply })
        .await
        .map_err(|_| AppError::LoopUnavailable)?;
    let report = rx.await.map_err(|_| AppError::LoopUnavailable)??;
    Ok(Json(report))
}

async fn get_scan_summary(State(state): State<ApiState>) -> Json<SummaryResponse> {
    let last = state.shared.state.last();
    let text = match &last {
        Some(snap) => render_summary(Some(&snap.metadata), &snap.result, state.summary_top_n),
        None => render_summary(None, &Default::default(), state.summary_top_n),
    };
    Json(SummaryResponse { text, metadata: last.map(|s| s.metadata) })
}

async fn get_opportunities(
    State(state): State<ApiState>,
    Query(params): Query<OpportunitiesQuery>,
) -> Json<Vec<OpportunityResponse>> {
    let Some(snap) = state.shared.state.last() else {
        return Json(Vec::new());
    };
    let limit = params.limit.unwrap_or(50);
    let min_score = params.min_score.unwrap_or(f64::NEG_INFINITY);

    let rows = snap
        .result
        .iter()
        .filter(|o| o.trade_score() >= min_score)
        .filter(|o| {
            params
                .category
                .as_ref()
                .map_or(true, |c| o.category.to_string() == c.to_lowercase())
        })
        .take(limit)
        .map(|o| opportunity_row(o, state.shared.state.is_alerted(&o.id)))
        .collect();

    Json(rows)
}

fn opportunity_row(o: &Opportunity, alerted: bool) -> OpportunityResponse {
    OpportunityResponse {
        id: o.id.clone(),
        name: o.name.clone(),
        city: o.city.clone(),
        venue: o.venue.clone(),
        date: o.date.clone(),
        source: o.source.clone(),
        category: o.category,
        price_min: o.price_min,
        price_max: o.price_max,
        demand_score: o.demand_score,
        risk_score: o.risk_score,
        margin_estimate: o.margin_estimate(),
        trade_score: o.trade_score(),
        url: o.url.clone(),
        tags: o.tags.clone(),
        alerted,
    }
}

async fn get_subscribers(State(state): State<ApiState>) -> Json<Vec<SubscriberId>> {
    Json(state.shared.subscribers.snapshot())
}

async fn add_subscriber(State(state): State<ApiState>, Path(id): Path<SubscriberId>) -> StatusCode {
    if state.shared.subscribers.add(id) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn remove_subscriber(State(state): State<ApiState>, Path(id): Path<SubscriberId>) -> StatusCode {
    if state.shared.subscribers.remove(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn add_artist(
    State(state): State<ApiState>,
    Path(id): Path<SubscriberId>,
    Json(entry): Json<WatchEntry>,
) -> Result<StatusCode, AppError> {
    add_watch(&state, id, WatchKind::Artist, &entry.name)
}

async fn add_city(
    State(state): State<ApiState>,
    Path(id): Path<SubscriberId>,
    Json(entry): Json<WatchEntry>,
) -> Result<StatusCode, AppError> {
    add_watch(&state, id, WatchKind::City, &entry.name)
}

fn add_watch(state: &ApiState, id: SubscriberId, kind: WatchKind, name: &str) -> Result<StatusCode, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".to_string()));
    }
    if state.shared.subscribers.watch(id, kind, name) {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

async fn get_watch(
    State(state): State<ApiState>,
    Path(id): Path<SubscriberId>,
) -> Result<Json<WatchResponse>, AppError> {
    let watch = state
        .shared
        .subscribers
        .watchlist(id)
        .ok_or(AppError::UnknownSubscriber(id))?;
    let text = render_watchlist(&watch);
    Ok(Json(WatchResponse { artists: watch.artists, cities: watch.cities, text }))
}

/// Last scan re-ranked with the subscriber's watchlist boosts.
async fn get_personal_opportunities(
    State(state): State<ApiState>,
    Path(id): Path<SubscriberId>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<OpportunityResponse>>, AppError> {
    let watch = state
        .shared
        .subscribers
        .watchlist(id)
        .ok_or(AppError::UnknownSubscriber(id))?;
    let Some(snap) = state.shared.state.last() else {
        return Ok(Json(Vec::new()));
    };
    let rows = watch
        .rerank(&snap.result)
        .iter()
        .take(params.limit.unwrap_or(state.summary_top_n))
        .map(|o| opportunity_row(o, state.shared.state.is_alerted(&o.id)))
        .collect();
    Ok(Json(rows))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let stats = &state.shared.latency;
    let p = stats.percentiles();
    Json(LatencyResponse {
        samples: stats.len(),
        p50_ms: p.map(|p| p.0),
        p95_ms: p.map(|p| p.1),
        p99_ms: p.map(|p| p.2),
        max_ms: p.map(|p| p.3),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::ManualScanPolicy;
    use crate::scan_loop::{ScanEngine, ScanLoop, ScanSettings};
    use crate::state::Subscribers;
    use crate::testkit::{opportunity, FixedProvider, RecordingNotifier};
    use crate::providers::Provider;
    use crate::scorer::profile::WATCHED_ARTIST_BOOST;
    use crate::types::Trigger;

    fn app_state(shared: Shared) -> (ApiState, mpsc::Receiver<ManualScan>) {
        let (manual_tx, rx) = mpsc::channel(4);
        (ApiState { shared, manual_tx, summary_top_n: 10 }, rx)
    }

    fn engine(shared: Shared) -> ScanEngine {
        let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(FixedProvider {
            name: "f",
            items: vec![opportunity("hi", 90.0), opportunity("lo", 30.0)],
        })];
        ScanEngine::new(
            providers,
            Arc::new(RecordingNotifier::default()),
            shared,
            ScanSettings {
                alert_threshold: 60.0,
                max_alerts_per_cycle: 5,
                manual_policy: ManualScanPolicy::ReportOnly,
                scan_interval: std::time::Duration::from_secs(3600),
                idle_recheck: std::time::Duration::from_secs(3600),
            },
        )
    }

    #[tokio::test]
    async fn manual_scan_round_trip() {
        let shared = Shared::new(Subscribers::new(&[]));
        let (state, rx) = app_state(shared.clone());
        let handle = tokio::spawn(ScanLoop::new(engine(shared), rx).run());

        let Json(report) = post_scan(State(state.clone())).await.unwrap();
        assert_eq!(report.trigger, Trigger::Manual);
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.alert_ids, vec!["hi"]);

        let Json(rows) = get_opportunities(
            State(state.clone()),
            Query(OpportunitiesQuery { limit: None, min_score: Some(50.0), category: None }),
        )
        .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "hi");
        assert_eq!(rows[0].trade_score, 90.0);
        assert!(!rows[0].alerted);

        let Json(summary) = get_scan_summary(State(state)).await;
        assert!(summary.text.contains("1. Event hi"));
        assert_eq!(summary.metadata.map(|m| m.evaluated), Some(2));

        handle.abort();
    }

    #[tokio::test]
    async fn scan_without_loop_is_unavailable() {
        let (state, rx) = app_state(Shared::new(Subscribers::new(&[])));
        drop(rx);
        assert!(matches!(post_scan(State(state)).await, Err(AppError::LoopUnavailable)));
    }

    #[tokio::test]
    async fn subscriber_registry() {
        let (state, _rx) = app_state(Shared::new(Subscribers::new(&[5])));
        assert_eq!(add_subscriber(State(state.clone()), Path(6)).await, StatusCode::CREATED);
        assert_eq!(add_subscriber(State(state.clone()), Path(6)).await, StatusCode::OK);
        assert_eq!(remove_subscriber(State(state.clone()), Path(5)).await, StatusCode::NO_CONTENT);
        assert_eq!(remove_subscriber(State(state.clone()), Path(5)).await, StatusCode::NOT_FOUND);
        let Json(ids) = get_subscribers(State(state)).await;
        assert_eq!(ids, vec![6]);
    }

    #[tokio::test]
    async fn watchlist_endpoints() {
        let (state, _rx) = app_state(Shared::new(Subscribers::new(&[])));
        let entry = |name: &str| Json(WatchEntry { name: name.to_string() });

        assert!(matches!(get_watch(State(state.clone()), Path(4)).await, Err(AppError::UnknownSubscriber(4))));
        assert_eq!(add_artist(State(state.clone()), Path(4), entry("Bicep")).await.unwrap(), StatusCode::CREATED);
        assert_eq!(add_artist(State(state.clone()), Path(4), entry("bicep")).await.unwrap(), StatusCode::OK);
        assert_eq!(add_city(State(state.clone()), Path(4), entry("Leeds")).await.unwrap(), StatusCode::CREATED);
        assert!(matches!(
            add_city(State(state.clone()), Path(4), entry("  ")).await,
            Err(AppError::InvalidInput(_))
        ));

        let Json(watch) = get_watch(State(state.clone()), Path(4)).await.unwrap();
        assert_eq!(watch.artists, vec!["Bicep"]);
        assert_eq!(watch.cities, vec!["Leeds"]);
        assert!(watch.text.contains("Artists: Bicep"));
        // watching registers the subscriber for alerts
        let Json(ids) = get_subscribers(State(state)).await;
        assert_eq!(ids, vec![4]);
    }

    #[tokio::test]
    async fn personal_ranking_follows_watchlist() {
        let shared = Shared::new(Subscribers::new(&[1, 2]));
        let (state, rx) = app_state(shared.clone());
        let handle = tokio::spawn(ScanLoop::new(engine(shared.clone()), rx).run());
        post_scan(State(state.clone())).await.unwrap();
        shared.subscribers.watch(2, WatchKind::Artist, "Event lo");

        let rows = |id| {
            let state = state.clone();
            async move {
                let Json(rows) =
                    get_personal_opportunities(State(state), Path(id), Query(LimitQuery { limit: None })).await.unwrap();
                rows
            }
        };
        let plain = rows(1).await;
        let fan = rows(2).await;
        let demand = |rows: &[OpportunityResponse], id: &str| rows.iter().find(|r| r.id == id).map(|r| r.demand_score);

        assert_eq!(demand(&plain, "lo"), Some(100.0));
        assert_eq!(demand(&fan, "lo"), Some(100.0 + WATCHED_ARTIST_BOOST));
        assert_eq!(demand(&fan, "hi"), Some(100.0));
        assert!(fan.iter().find(|r| r.id == "lo").unwrap().trade_score > 30.0 + WATCHED_ARTIST_BOOST - 1e-9);
        assert!(matches!(
            get_personal_opportunities(State(state.clone()), Path(99), Query(LimitQuery { limit: None })).await,
            Err(AppError::UnknownSubscriber(99))
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn health_before_any_scan() {
        let (state, _rx) = app_state(Shared::new(Subscribers::new(&[])));
        let Json(h) = get_health(State(state.clone())).await;
        assert_eq!(h.phase, Phase::Idle);
        assert_eq!(h.last_scan_at, None);
        let Json(lat) = get_stats_latency(State(state)).await;
        assert_eq!(lat.samples, 0);
        assert_eq!(lat.p50_ms, None);
    }
}
