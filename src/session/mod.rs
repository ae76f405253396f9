//! Agent working sessions: bounded recency lists and the concurrent store.

pub mod recency;
pub mod store;

pub use recency::RecencyList;
pub use store::{BASELINE_BOOST, BoostWeights, SessionLimits, SessionSnapshot, SessionStore};
