pub mod opportunity_scorer;
pub mod profile;

pub use opportunity_scorer::{Listing, OpportunityScorer};
pub use profile::margin_estimate;
