pub mod scan_state;
pub mod subscribers;

pub use scan_state::{ScanSnapshot, ScanState};
pub use subscribers::{Subscribers, WatchKind, Watchlist};
