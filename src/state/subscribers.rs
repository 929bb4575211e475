use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::scorer::profile::{WATCHED_ARTIST_BOOST, WATCHED_CITY_BOOST};
use crate::types::{Opportunity, ScanResult, SubscriberId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Artist,
    City,
}

/// Artists and cities one subscriber asked to track. Entries keep the
/// casing they were added with; matching ignores case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Watchlist {
    pub artists: Vec<String>,
    pub cities: Vec<String>,
}

impl Watchlist {
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.cities.is_empty()
    }

    /// Returns true if the value was new. Blank values are ignored.
    pub fn add(&mut self, kind: WatchKind, value: &str) -> bool {
        let list = match kind {
            WatchKind::Artist => &mut self.artists,
            WatchKind::City => &mut self.cities,
        };
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let lower = value.to_lowercase();
        if list.iter().any(|v| v.to_lowercase() == lower) {
            return false;
        }
        list.push(value.to_string());
        true
    }

    /// Watched artists named in the title, then the event city if watched.
    pub fn matches(&self, o: &Opportunity) -> Vec<&str> {
        let name = o.name.to_lowercase();
        let city = o.city.to_lowercase();
        self.artists
            .iter()
            .filter(|a| name.contains(&a.to_lowercase()))
            .chain(self.cities.iter().filter(|c| c.to_lowercase() == city))
            .map(String::as_str)
            .collect()
    }

    /// Extra demand this subscriber would give `o`. Each kind counts once.
    pub fn boost(&self, o: &Opportunity) -> f64 {
        let name = o.name.to_lowercase();
        let city = o.city.to_lowercase();
        let mut boost = 0.0;
        if self.artists.iter().any(|a| name.contains(&a.to_lowercase())) {
            boost += WATCHED_ARTIST_BOOST;
        }
        if self.cities.iter().any(|c| c.to_lowercase() == city) {
            boost += WATCHED_CITY_BOOST;
        }
        boost
    }

    /// `result` re-ranked with this watchlist's boosts added to demand.
    pub fn rerank(&self, result: &ScanResult) -> ScanResult {
        let boosted = result
            .iter()
            .map(|o| {
                let mut boosted = o.clone();
                boosted.demand_score += self.boost(o);
                boosted
            })
            .collect();
        ScanResult::rank(boosted)
    }
}

/// Registered alert recipients and their watchlists. The scan loop only
/// reads a snapshot per cycle.
pub struct Subscribers {
    entries: DashMap<SubscriberId, Watchlist>,
}

impl Subscribers {
    pub fn new(initial: &[SubscriberId]) -> Arc<Self> {
        let entries = DashMap::new();
        for &id in initial {
            entries.insert(id, Watchlist::default());
        }
        Arc::new(Self { entries })
    }

    /// Returns true if the id was not already registered.
    pub fn add(&self, id: SubscriberId) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Watchlist::default());
                true
            }
        }
    }

    /// Drops the subscriber together with its watchlist.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Adds to the subscriber's watchlist, registering the subscriber first
    /// if needed. Returns true if the value was new.
    pub fn watch(&self, id: SubscriberId, kind: WatchKind, value: &str) -> bool {
        self.entries.entry(id).or_default().add(kind, value)
    }

    pub fn watchlist(&self, id: SubscriberId) -> Option<Watchlist> {
        self.entries.get(&id).map(|w| w.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sorted so dispatch order is stable across cycles.
    pub fn snapshot(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<SubscriberId> = self.entries.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids with their watchlists, in `snapshot` order.
    pub fn recipients(&self) -> Vec<(SubscriberId, Watchlist)> {
        let mut out: Vec<_> = self.entries.iter().map(|r| (*r.key(), r.value().clone())).collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }
}
