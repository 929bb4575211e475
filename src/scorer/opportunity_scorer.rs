use chrono::NaiveDate;

use crate::config::Rosters;
use crate::scorer::profile::{
    CITY_MATCH_BOOST, PROXIMITY_BOOST_PER_DAY, PROXIMITY_WINDOW_DAYS, RISK_TAG_ADDITIONS,
    UNKNOWN_DATE_PENALTY,
};
use crate::types::Category;

/// Raw attributes of a listing, before scoring.
#[derive(Debug, Clone)]
pub struct Listing<'a> {
    pub name: &'a str,
    pub city: &'a str,
    pub category: Category,
    /// 0.0 = unknown.
    pub price_min: f64,
    pub event_date: Option<NaiveDate>,
    pub tags: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub demand: f64,
    pub risk: f64,
}

/// Heuristic demand/risk scoring. Deterministic for a given `today`.
/// Scores are not clamped; many simultaneous boosts can push demand past 100.
#[derive(Debug, Clone)]
pub struct OpportunityScorer {
    rosters: Rosters,
    cities: Vec<String>,
}

impl OpportunityScorer {
    pub fn new(rosters: Rosters, cities_of_interest: Vec<String>) -> Self {
        let cities = cities_of_interest.iter().map(|c| c.to_lowercase()).collect();
        Self { rosters, cities }
    }

    pub fn rosters(&self) -> &Rosters {
        &self.rosters
    }

    pub fn score(&self, listing: &Listing<'_>, today: NaiveDate) -> Scores {
        Scores {
            demand: self.demand(listing, today),
            risk: risk(listing),
        }
    }

    fn demand(&self, listing: &Listing<'_>, today: NaiveDate) -> f64 {
        let p = listing.category.profile();
        let mut demand = p.base_demand;

        if self.cities.contains(&listing.city.to_lowercase()) {
            demand += CITY_MATCH_BOOST;
        }

        demand += self.keyword_boost(listing);

        let price_known = listing.price_min > 0.0;
        if p.is_cheap(listing.price_min) {
            demand += p.cheap_entry_boost;
        } else if !price_known && listing.event_date.is_some() {
            demand += p.presale_demand_boost;
        }

        match listing.event_date {
            Some(date) => demand += proximity_boost(date, today),
            None => demand -= UNKNOWN_DATE_PENALTY,
        }

        demand
    }

    fn keyword_boost(&self, listing: &Listing<'_>) -> f64 {
        let p = listing.category.profile();
        let roster = self.rosters.for_category(listing.category);
        let name = listing.name.to_lowercase();
        let hit = |names: &[String]| names.iter().any(|k| name.contains(&k.to_lowercase()));

        if hit(roster.headline.as_slice()) {
            p.headline_boost
        } else if hit(roster.mid_tier.as_slice()) {
            p.mid_tier_boost
        } else {
            0.0
        }
    }
}

/// `(window - days) * per_day` for events inside the window, else 0.
pub fn proximity_boost(date: NaiveDate, today: NaiveDate) -> f64 {
    let days = (date - today).num_days();
    if (0..=PROXIMITY_WINDOW_DAYS).contains(&days) {
        (PROXIMITY_WINDOW_DAYS - days) as f64 * PROXIMITY_BOOST_PER_DAY
    } else {
        0.0
    }
}

fn risk(listing: &Listing<'_>) -> f64 {
    let base = listing.category.profile().base_risk;
    let extra: f64 = RISK_TAG_ADDITIONS
        .iter()
        .filter(|(tag, _)| listing.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        .map(|(_, add)| add)
        .sum();
    base + extra
}
