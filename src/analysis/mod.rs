//! Code analysis modules.
//!
//! - Dead code detection (reachability over the project graph)
//! - Stale file detection (git history)

pub mod dead_code;
pub mod stale;

// Re-exports
pub use dead_code::DeadCodeAnalyzer;
pub use stale::{GitLogReader, HistoryReader, StaleFileAnalyzer, deletion_candidates};
