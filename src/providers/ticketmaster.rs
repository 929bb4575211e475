use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, UNKNOWN_CITY, UNKNOWN_DATE, UNKNOWN_VENUE};
use crate::error::{FetchError, Result};
use crate::extract::format_date;
use crate::fetcher::HttpGet;
use crate::providers::{Provider, ScanContext};
use crate::scorer::{Listing, OpportunityScorer};
use crate::types::{Category, Opportunity};

pub const UNKNOWN_EVENT: &str = "Unknown event";

/// Upper bound on the search window, about ten years.
pub const MAX_WINDOW_DAYS: u64 = 3_660;

/// Ticketmaster Discovery v2 event search. One GET per scan.
pub struct TicketmasterProvider {
    http: Arc<dyn HttpGet>,
    api_url: String,
    api_key: String,
    country: String,
    window_days: i64,
    page_size: u32,
    scorer: Arc<OpportunityScorer>,
}

impl TicketmasterProvider {
    /// `None` when no API key is configured.
    pub fn from_config(
        cfg: &Config,
        http: Arc<dyn HttpGet>,
        scorer: Arc<OpportunityScorer>,
    ) -> Option<Self> {
        let api_key = cfg.ticketmaster_api_key.clone()?;
        Some(Self {
            http,
            api_url: cfg.ticketmaster_api_url.clone(),
            api_key,
            country: cfg.ticketmaster_country.clone(),
            window_days: cfg.ticketmaster_window_days,
            page_size: cfg.ticketmaster_page_size,
            scorer,
        })
    }

    fn query(&self, today: NaiveDate) -> Vec<(&'static str, String)> {
        let end = window_end(today, self.window_days);
        let keyword = self
            .scorer
            .rosters()
            .festival
            .headline
            .iter()
            .chain(self.scorer.rosters().boxing.headline.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut params = vec![
            ("apikey", self.api_key.clone()),
            ("countryCode", self.country.clone()),
            ("size", self.page_size.to_string()),
            ("sort", "date,asc".to_string()),
            ("startDateTime", format!("{}T00:00:00Z", today.format("%Y-%m-%d"))),
            ("endDateTime", format!("{}T23:59:59Z", end.format("%Y-%m-%d"))),
        ];
        if !keyword.is_empty() {
            params.push(("keyword", keyword));
        }
        params
    }

    async fn try_fetch(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>> {
        let resp = self.http.get(&self.api_url, &self.query(ctx.today)).await?;
        if !(200..300).contains(&resp.status) {
            return Err(FetchError::Status { status: resp.status, url: self.api_url.clone() }.into());
        }

        let body: Value = serde_json::from_str(&resp.body)?;
        let Some(events) = body.pointer("/_embedded/events").and_then(Value::as_array) else {
            debug!("ticketmaster: response has no events");
            return Ok(Vec::new());
        };

        Ok(events.iter().map(|ev| self.parse_event(ev, ctx)).collect())
    }

    fn parse_event(&self, ev: &Value, ctx: &ScanContext) -> Opportunity {
        let name = str_at(ev, "/name").unwrap_or(UNKNOWN_EVENT).to_string();
        let id = str_at(ev, "/id").map(String::from).unwrap_or_else(|| name.clone());

        let venue = ev.pointer("/_embedded/venues/0");
        let city = venue
            .and_then(|v| str_at(v, "/city/name"))
            .unwrap_or(UNKNOWN_CITY)
            .to_string();
        let venue_name = venue
            .and_then(|v| str_at(v, "/name"))
            .unwrap_or(UNKNOWN_VENUE)
            .to_string();

        let price_min = num_at(ev, "/priceRanges/0/min").unwrap_or(0.0).max(0.0);
        let price_max = match num_at(ev, "/priceRanges/0/max").unwrap_or(0.0).max(0.0) {
            max if max > 0.0 => max,
            _ => price_min,
        };

        let (event_date, date) = start_date(ev);
        let (category, tags) = classify(ev);

        let scores = self.scorer.score(
            &Listing {
                name: &name,
                city: &city,
                category,
                price_min,
                event_date,
                tags: &tags,
            },
            ctx.today,
        );

        Opportunity {
            id,
            name,
            city,
            venue: venue_name,
            date,
            source: self.name().to_string(),
            category,
            price_min,
            price_max,
            demand_score: scores.demand,
            risk_score: scores.risk,
            url: str_at(ev, "/url").map(String::from),
            tags,
        }
    }
}

#[async_trait]
impl Provider for TicketmasterProvider {
    fn name(&self) -> &'static str {
        "ticketmaster"
    }

    async fn fetch(&self, ctx: &ScanContext) -> Vec<Opportunity> {
        match self.try_fetch(ctx).await {
            Ok(items) => {
                info!(listed = items.len(), "ticketmaster: {} events", items.len());
                items
            }
            Err(e) => {
                warn!("ticketmaster fetch failed: {e}");
                Vec::new()
            }
        }
    }
}

/// `today + days`, clamped to `MAX_WINDOW_DAYS`. Negative windows end today.
fn window_end(today: NaiveDate, days: i64) -> NaiveDate {
    let days = u64::try_from(days).unwrap_or(0).min(MAX_WINDOW_DAYS);
    today.checked_add_days(Days::new(days)).unwrap_or(today)
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn num_at(v: &Value, pointer: &str) -> Option<f64> {
    let n = v.pointer(pointer)?;
    n.as_f64()
        .or_else(|| n.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite())
}

/// Event date plus its display label. A full start timestamp shows the time
/// as well; a date-only start shows just the day.
fn start_date(ev: &Value) -> (Option<NaiveDate>, String) {
    if let Some(dt) = str_at(ev, "/dates/start/dateTime")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        let naive = dt.naive_utc();
        return (Some(naive.date()), naive.format("%a %d %b %Y %H:%M").to_string());
    }
    if let Some(d) = str_at(ev, "/dates/start/localDate")
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    {
        return (Some(d), format_date(d));
    }
    (None, UNKNOWN_DATE.to_string())
}

fn classify(ev: &Value) -> (Category, Vec<String>) {
    let mut names: Vec<String> = Vec::new();
    let mut segment_music = false;

    if let Some(classes) = ev.get("classifications").and_then(Value::as_array) {
        for class in classes {
            for key in ["segment", "genre", "subGenre", "type", "subType"] {
                let Some(name) = str_at(class, &format!("/{key}/name")) else { continue };
                if name.eq_ignore_ascii_case("undefined") {
                    continue;
                }
                if key == "segment" && name.eq_ignore_ascii_case("music") {
                    segment_music = true;
                }
                if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.to_string());
                }
            }
        }
    }

    let name_is_boxing = str_at(ev, "/name")
        .map(|n| n.to_lowercase().contains("boxing"))
        .unwrap_or(false);
    let category = if name_is_boxing || names.iter().any(|n| n.to_lowercase().contains("boxing")) {
        Category::Boxing
    } else if segment_music {
        Category::Festival
    } else {
        Category::Generic
    };
    (category, names)
}
