use crate::types::Category;

/// Demand-score midpoint above which the margin estimate starts to grow.
pub const DEMAND_MIDPOINT: f64 = 50.0;

/// Boost for an event in one of the configured cities of interest.
pub const CITY_MATCH_BOOST: f64 = 10.0;

/// Per-subscriber hints: a watched artist in the event title, a watched city.
pub const WATCHED_ARTIST_BOOST: f64 = 30.0;
pub const WATCHED_CITY_BOOST: f64 = 15.0;

/// Events this many days out or closer get a proximity boost.
pub const PROXIMITY_WINDOW_DAYS: i64 = 30;
pub const PROXIMITY_BOOST_PER_DAY: f64 = 0.5;

/// Applied when no date could be read for the listing.
pub const UNKNOWN_DATE_PENALTY: f64 = 5.0;

/// Tag → risk addition. Matched case-insensitively against the listing tags.
pub const RISK_TAG_ADDITIONS: &[(&str, f64)] = &[
    ("mega-fight", 5.0),
    ("title-fight", 3.0),
    ("outdoor", 3.0),
    ("debut", 4.0),
];

/// Source-specific scoring constants. One table per [`Category`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProfile {
    pub base_demand: f64,
    pub base_risk: f64,
    pub headline_boost: f64,
    pub mid_tier_boost: f64,
    /// Entry prices at or below this (and above zero) count as cheap.
    pub cheap_entry_threshold: f64,
    pub cheap_entry_boost: f64,
    /// Demand boost used instead of the cheap-entry boost when the price is
    /// unknown but the date is known.
    pub presale_demand_boost: f64,
    pub base_margin: f64,
    /// Replaces `base_margin` when the price is unknown.
    pub presale_margin: f64,
    pub cheap_ticket_margin: f64,
    pub demand_excess_coeff: f64,
}

pub const FESTIVAL: CategoryProfile = CategoryProfile {
    base_demand: 45.0,
    base_risk: 12.0,
    headline_boost: 25.0,
    mid_tier_boost: 12.0,
    cheap_entry_threshold: 60.0,
    cheap_entry_boost: 10.0,
    presale_demand_boost: 8.0,
    base_margin: 8.0,
    presale_margin: 15.0,
    cheap_ticket_margin: 10.0,
    demand_excess_coeff: 0.4,
};

// Combat sports: cancellation and injury variance.
pub const BOXING: CategoryProfile = CategoryProfile {
    base_demand: 50.0,
    base_risk: 28.0,
    headline_boost: 25.0,
    mid_tier_boost: 15.0,
    cheap_entry_threshold: 80.0,
    cheap_entry_boost: 10.0,
    presale_demand_boost: 10.0,
    base_margin: 10.0,
    presale_margin: 18.0,
    cheap_ticket_margin: 8.0,
    demand_excess_coeff: 0.35,
};

pub const GENERIC: CategoryProfile = CategoryProfile {
    base_demand: 40.0,
    base_risk: 20.0,
    headline_boost: 25.0,
    mid_tier_boost: 10.0,
    cheap_entry_threshold: 40.0,
    cheap_entry_boost: 10.0,
    presale_demand_boost: 6.0,
    base_margin: 5.0,
    presale_margin: 12.0,
    cheap_ticket_margin: 6.0,
    demand_excess_coeff: 0.35,
};

impl Category {
    pub fn profile(&self) -> &'static CategoryProfile {
        match self {
            Category::Festival => &FESTIVAL,
            Category::Boxing => &BOXING,
            Category::Generic => &GENERIC,
        }
    }
}

impl CategoryProfile {
    pub fn is_cheap(&self, price_min: f64) -> bool {
        price_min > 0.0 && price_min <= self.cheap_entry_threshold
    }
}

/// `base + cheap bonus + coeff * (demand - midpoint)`, floored at zero.
/// An unknown price (`0.0`) is treated as a presale and uses the presale base.
pub fn margin_estimate(category: Category, demand_score: f64, price_min: f64) -> f64 {
    let p = category.profile();
    let base = if price_min > 0.0 { p.base_margin } else { p.presale_margin };
    let cheap = if p.is_cheap(price_min) { p.cheap_ticket_margin } else { 0.0 };
    let excess = (demand_score - DEMAND_MIDPOINT).max(0.0) * p.demand_excess_coeff;
    (base + cheap + excess).max(0.0)
}
