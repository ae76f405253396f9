//! Shared state of an indexed workspace.
//!
//! `IndexState` owns the published graph snapshot, the configuration and the
//! session store. Readers clone the `Arc` of the current graph and keep using
//! it while a re-scan builds and publishes a replacement.

use crate::analysis::{DeadCodeAnalyzer, StaleFileAnalyzer, deletion_candidates};
use crate::config::{ConfigOverrides, IndexConfig};
use crate::error::IndexError;
use crate::graph::ProjectGraph;
use crate::scan::{ProjectScanner, ScanSummary};
use crate::session::SessionStore;
use crate::types::{DeadCodeReport, DeletionCandidate, StaleFilesReport};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// The complete state of one indexed workspace.
pub struct IndexState {
    root: PathBuf,
    config: IndexConfig,
    /// Current graph snapshot, swapped whole on re-scan
    graph: RwLock<Arc<ProjectGraph>>,
    last_scan: RwLock<Option<ScanSummary>>,
    last_indexed: RwLock<Option<Instant>>,
    sessions: SessionStore,
    /// Serializes scans; readers never take it
    scan_lock: tokio::sync::Mutex<()>,
}

impl IndexState {
    /// Create an empty state. Nothing is scanned until [`Self::rescan`].
    pub fn new(root: impl Into<PathBuf>, config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let sessions = SessionStore::new(root.clone(), &config)?;
        Ok(Self {
            root,
            config,
            graph: RwLock::new(Arc::new(ProjectGraph::default())),
            last_scan: RwLock::new(None),
            last_indexed: RwLock::new(None),
            sessions,
            scan_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Load `<root>/.polyindex/config.json` (if any), apply overrides and
    /// create the state.
    pub fn open(root: &Path, overrides: &ConfigOverrides) -> Result<Self, IndexError> {
        let config = IndexConfig::load(root)?.with_overrides(overrides)?;
        Self::new(root, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The current graph snapshot.
    pub fn graph(&self) -> Arc<ProjectGraph> {
        Arc::clone(&self.graph.read())
    }

    pub fn last_scan(&self) -> Option<ScanSummary> {
        self.last_scan.read().clone()
    }

    pub fn is_scanned(&self) -> bool {
        self.last_indexed.read().is_some()
    }

    /// Replace the published graph.
    pub fn publish(&self, graph: ProjectGraph) {
        *self.graph.write() = Arc::new(graph);
        *self.last_indexed.write() = Some(Instant::now());
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Scan the workspace with the state's configuration and publish the
    /// result.
    pub async fn rescan(&self) -> Result<ScanSummary, IndexError> {
        self.rescan_with(&ConfigOverrides::default()).await
    }

    /// Scan with per-call overrides. The state's configuration is unchanged.
    pub async fn rescan_with(&self, overrides: &ConfigOverrides) -> Result<ScanSummary, IndexError> {
        let config = self.config.with_overrides(overrides)?;
        let _guard = self.scan_lock.lock().await;

        let report = ProjectScanner::new(config).scan(&self.root).await?;
        let summary = report.summary();
        self.publish(report.graph);
        *self.last_scan.write() = Some(summary.clone());

        info!(
            root = %self.root.display(),
            symbols = summary.stats.symbols,
            "published graph"
        );
        Ok(summary)
    }

    /// Scan once if nothing has been published yet.
    pub async fn ensure_scanned(&self) -> Result<(), IndexError> {
        if !self.is_scanned() {
            self.rescan().await?;
        }
        Ok(())
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Dead code report for the current snapshot.
    pub fn dead_code(&self) -> DeadCodeReport {
        DeadCodeAnalyzer::new().analyze(&self.graph())
    }

    /// Stale file report over the files of the current snapshot.
    pub async fn stale_files(&self, overrides: &ConfigOverrides) -> Result<StaleFilesReport, IndexError> {
        let config = self.config.with_overrides(overrides)?;
        let analyzer = StaleFileAnalyzer::new(config.stale_days)?;
        let graph = self.graph();
        let files: Vec<PathBuf> = graph.files().map(|(path, _)| path.clone()).collect();
        Ok(analyzer
            .analyze_repository(&self.root, &files, config.history_timeout())
            .await)
    }

    /// Stale files that also declare unreachable symbols.
    pub async fn deletion_candidates(
        &self,
        overrides: &ConfigOverrides,
    ) -> Result<Vec<DeletionCandidate>, IndexError> {
        let stale = self.stale_files(overrides).await?;
        Ok(deletion_candidates(&stale, &self.dead_code()))
    }
}

/// Thread-safe shared state handle.
pub type SharedState = Arc<IndexState>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rescan_publishes_new_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn a() {}\n").unwrap();
        let state = IndexState::new(dir.path(), IndexConfig::default()).unwrap();
        assert!(!state.is_scanned());

        state.ensure_scanned().await.unwrap();
        let before = state.graph();
        assert_eq!(before.find_by_name("a").len(), 1);

        std::fs::write(dir.path().join("lib.rs"), "pub fn a() {}\npub fn b() {}\n").unwrap();
        state.rescan().await.unwrap();

        // The earlier snapshot is unchanged
        assert!(before.find_by_name("b").is_empty());
        assert_eq!(state.graph().find_by_name("b").len(), 1);
        assert!(state.last_scan().is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig {
            stale_days: -3,
            ..Default::default()
        };
        assert!(matches!(
            IndexState::new(dir.path(), config),
            Err(IndexError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_overrides_do_not_leak() {
        let dir = TempDir::new().unwrap();
        let state = IndexState::new(dir.path(), IndexConfig::default()).unwrap();
        let bad = ConfigOverrides {
            stale_days: Some(-1),
            ..Default::default()
        };
        assert!(state.stale_files(&bad).await.is_err());
        assert_eq!(state.config().stale_days, 90);
    }
}
