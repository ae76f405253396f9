// Allow some clippy lints that are too strict for our codebase
#![allow(clippy::collapsible_if)]

//! polyindex
//!
//! A multi-language code intelligence index for AI coding agents.
//!
//! # Architecture
//!
//! 1. **Scanning**: per-language scanners (Rust, TypeScript/JavaScript,
//!    Python, Vue) turn each file into a self-contained fragment in parallel.
//!
//! 2. **Linking**: fragments are merged in path order into one immutable
//!    [`ProjectGraph`]; references are resolved across files and languages,
//!    including HTTP client calls to the routes that serve them.
//!
//! 3. **Analysis**: reachability-based dead code detection and git-history
//!    stale file detection run read-only over a graph snapshot.
//!
//! 4. **Sessions**: bounded recency of files, queries and edits per agent,
//!    turned into a ranking boost.
//!
//! # Usage
//!
//! ```ignore
//! use polyindex::{IndexConfig, IndexState};
//!
//! let state = IndexState::new("/path/to/repo", IndexConfig::default())?;
//! state.rescan().await?;
//!
//! let report = state.dead_code();
//! for symbol in &report.unreachable {
//!     println!("{} {}:{}", symbol.name, symbol.file.display(), symbol.lines.start);
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod linker;
pub mod parsing;
pub mod scan;
pub mod types;

pub mod analysis;
pub mod dispatch;
pub mod session;
pub mod state;
#[cfg(feature = "watch")]
pub mod watch;

// Re-exports
pub use analysis::{DeadCodeAnalyzer, GitLogReader, HistoryReader, StaleFileAnalyzer};
pub use config::{ConfigOverrides, IndexConfig};
pub use discovery::FileDiscovery;
pub use dispatch::{ToolCall, ToolRegistry, dispatch};
pub use error::{HistoryLookupFailure, IndexError, ParseFailure};
pub use graph::{FileInfo, GraphStats, ProjectGraph};
pub use linker::{AmbiguityPolicy, Linker};
pub use scan::{ProjectScanner, ScanReport, ScanSummary};
pub use session::{BASELINE_BOOST, SessionStore};
pub use state::{IndexState, SharedState};
pub use types::*;
