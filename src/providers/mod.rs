pub mod discovery;
pub mod ticketmaster;
pub mod watchlist;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::types::Opportunity;

pub use discovery::DiscoveryProvider;
pub use ticketmaster::TicketmasterProvider;
pub use watchlist::WatchlistProvider;

/// Per-scan inputs shared by every provider.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext {
    /// UTC date the scan runs on; date proximity is measured from here.
    pub today: NaiveDate,
}

impl ScanContext {
    pub fn now() -> Self {
        Self { today: Utc::now().date_naive() }
    }
}

/// One data source. `fetch` never fails: implementations log their own
/// errors and return an empty list, so one broken source never blocks the rest.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, ctx: &ScanContext) -> Vec<Opportunity>;
}
