use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scorer;

/// Chat/notification destination. The transport decides what the number means.
pub type SubscriberId = i64;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Festival,
    Boxing,
    Generic,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Festival => "festival",
            Category::Boxing => "boxing",
            Category::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

pub fn parse_category_str(s: &str) -> Category {
    match s.trim().to_lowercase().as_str() {
        "festival" | "music" => Category::Festival,
        "boxing" => Category::Boxing,
        _ => Category::Generic,
    }
}

// ---------------------------------------------------------------------------
// WatchTarget
// ---------------------------------------------------------------------------

/// A page to monitor. Curated targets come from config; discovered ones from
/// crawling category listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchTarget {
    pub url: String,
    pub label: String,
    pub city: String,
    pub venue: String,
    pub category: Category,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// One normalized, scored listing.
///
/// `margin_estimate` and `trade_score` are methods, not fields: they are
/// derived from the stored scores on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    /// Dedup key. Source URL for scraped listings, event id (or name) for APIs.
    pub id: String,
    pub name: String,
    pub city: String,
    pub venue: String,
    pub date: String,
    pub source: String,
    pub category: Category,
    /// 0.0 = unknown.
    pub price_min: f64,
    /// 0.0 = unknown.
    pub price_max: f64,
    pub demand_score: f64,
    pub risk_score: f64,
    pub url: Option<String>,
    pub tags: Vec<String>,
}

impl Opportunity {
    pub fn price_known(&self) -> bool {
        self.price_min > 0.0
    }

    pub fn margin_estimate(&self) -> f64 {
        scorer::margin_estimate(self.category, self.demand_score, self.price_min)
    }

    pub fn trade_score(&self) -> f64 {
        self.demand_score + self.margin_estimate() - self.risk_score
    }
}

// ---------------------------------------------------------------------------
// ScanResult
// ---------------------------------------------------------------------------

/// Opportunities from one scan, ranked by trade score (highest first).
/// Equal scores keep the order the providers emitted them in.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    ranked: Vec<Opportunity>,
}

impl ScanResult {
    pub fn rank(mut opportunities: Vec<Opportunity>) -> Self {
        // sort_by is stable
        opportunities.sort_by(|a, b| b.trade_score().total_cmp(&a.trade_score()));
        Self { ranked: opportunities }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Opportunity> {
        self.ranked.iter()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn top(&self, n: usize) -> &[Opportunity] {
        &self.ranked[..n.min(self.ranked.len())]
    }
}

// ---------------------------------------------------------------------------
// Scan metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Timer,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Timer => write!(f, "timer"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Last-scan bookkeeping. One global value, overwritten by every scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanMetadata {
    pub scanned_at: DateTime<Utc>,
    pub evaluated: usize,
    pub trigger: Trigger,
    pub alerts_selected: usize,
    pub deliveries_ok: usize,
    pub deliveries_failed: usize,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
