//! Stale file analysis via git history.
//!
//! A file is stale when its most recent commit is older than the configured
//! threshold. The repository log is read once per pass; files the log never
//! mentions are reported as untracked, and a failed or timed out read
//! degrades every file to untracked with a diagnostic.

use crate::error::{HistoryLookupFailure, IndexError};
use crate::types::{DeadCodeReport, DeletionCandidate, StaleFile, StaleFilesReport};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tracing::{debug, warn};

const SECONDS_PER_DAY: u64 = 86_400;

/// Separates commits in the log output.
const COMMIT_MARKER: char = '\u{1e}';

/// Source of per-file commit times.
pub trait HistoryReader: Send + Sync {
    /// Latest commit time (unix seconds) for a path relative to the project
    /// root; `Ok(None)` when the file has no history.
    fn last_commit(&self, path: &Path) -> Result<Option<u64>, HistoryLookupFailure>;
}

/// Fixed history, keyed by relative path.
impl HistoryReader for HashMap<PathBuf, u64> {
    fn last_commit(&self, path: &Path) -> Result<Option<u64>, HistoryLookupFailure> {
        Ok(self.get(path).copied())
    }
}

// ============================================================================
// Git Log Reader
// ============================================================================

/// Latest commit time per path, loaded from a single `git log` run.
#[derive(Debug, Clone, Default)]
pub struct GitLogReader {
    latest: HashMap<PathBuf, u64>,
    failure: Option<String>,
}

impl GitLogReader {
    /// Read the log of the repository containing `root`.
    ///
    /// Never fails: a missing repository, a git error or the timeout yields
    /// a reader whose every lookup reports that failure.
    pub async fn load(root: &Path, timeout: Duration) -> Self {
        let mut command = Command::new("git");
        command
            .args([
                "-c",
                "core.quotepath=off",
                "log",
                "--no-renames",
                "--relative",
                "--name-only",
            ])
            .arg(format!("--format=format:{COMMIT_MARKER}%ct"))
            .current_dir(root)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => {
                return Self::failed(format!("git log timed out after {}s", timeout.as_secs()));
            }
            Ok(Err(e)) => return Self::failed(format!("failed to execute git: {e}")),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Self::failed(format!("git log failed: {}", stderr.trim()));
        }

        let reader = Self::from_log(&String::from_utf8_lossy(&output.stdout));
        debug!(
            root = %root.display(),
            files = reader.latest.len(),
            "loaded commit history"
        );
        reader
    }

    /// Parse `git log --name-only` output whose commit headers are the marker
    /// followed by the committer timestamp. Newest commits come first.
    pub fn from_log(text: &str) -> Self {
        let mut latest = HashMap::new();
        let mut current: Option<u64> = None;

        for line in text.lines() {
            if let Some(header) = line.strip_prefix(COMMIT_MARKER) {
                current = header.trim().parse().ok();
                continue;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(time) = current {
                latest.entry(PathBuf::from(line)).or_insert(time);
            }
        }

        Self {
            latest,
            failure: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!("History unavailable: {message}");
        Self {
            latest: HashMap::new(),
            failure: Some(message),
        }
    }

    pub fn is_available(&self) -> bool {
        self.failure.is_none()
    }
}

impl HistoryReader for GitLogReader {
    fn last_commit(&self, path: &Path) -> Result<Option<u64>, HistoryLookupFailure> {
        if let Some(message) = &self.failure {
            return Err(HistoryLookupFailure {
                path: path.to_path_buf(),
                message: message.clone(),
            });
        }
        Ok(self.latest.get(&normalize(path)).copied())
    }
}

fn normalize(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

// ============================================================================
// Analyzer
// ============================================================================

/// Classifies files by the age of their most recent commit.
#[derive(Debug, Clone, Copy)]
pub struct StaleFileAnalyzer {
    stale_days: u64,
    now: Option<u64>,
}

impl StaleFileAnalyzer {
    /// Fails with `InvalidConfiguration` for a negative threshold.
    pub fn new(stale_days: i64) -> Result<Self, IndexError> {
        let stale_days = u64::try_from(stale_days).map_err(|_| {
            IndexError::config(format!("stale_days must be non-negative, got {stale_days}"))
        })?;
        Ok(Self {
            stale_days,
            now: None,
        })
    }

    /// Measure ages against a fixed time instead of the clock.
    pub fn at(mut self, now: u64) -> Self {
        self.now = Some(now);
        self
    }

    pub fn stale_days(&self) -> u64 {
        self.stale_days
    }

    /// Classify `files` (relative to the project root).
    pub fn analyze<'a>(
        &self,
        files: impl IntoIterator<Item = &'a Path>,
        history: &dyn HistoryReader,
    ) -> StaleFilesReport {
        let now = self.now.unwrap_or_else(unix_now);
        let threshold = self.stale_days.saturating_mul(SECONDS_PER_DAY);

        let mut stale_files = Vec::new();
        let mut untracked = Vec::new();
        let mut diagnostics = Vec::new();

        for path in files {
            match history.last_commit(path) {
                Ok(Some(last_modified)) => {
                    let idle = now.saturating_sub(last_modified);
                    if idle > threshold {
                        stale_files.push(StaleFile {
                            path: path.to_path_buf(),
                            last_modified,
                            days_idle: idle / SECONDS_PER_DAY,
                        });
                    }
                }
                Ok(None) => untracked.push(path.to_path_buf()),
                Err(failure) => {
                    untracked.push(path.to_path_buf());
                    diagnostics.push(failure);
                }
            }
        }

        stale_files.sort_by(|a, b| b.days_idle.cmp(&a.days_idle).then_with(|| a.path.cmp(&b.path)));
        untracked.sort();
        untracked.dedup();

        StaleFilesReport {
            stale_days: self.stale_days,
            generated_at: now,
            stale_files,
            untracked,
            diagnostics,
        }
    }

    /// Load the git history of `root` and classify `files`.
    pub async fn analyze_repository(
        &self,
        root: &Path,
        files: &[PathBuf],
        timeout: Duration,
    ) -> StaleFilesReport {
        let history = GitLogReader::load(root, timeout).await;
        self.analyze(files.iter().map(PathBuf::as_path), &history)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Stale files that also declare unreachable symbols, most unreachable
/// symbols first, then longest idle.
pub fn deletion_candidates(stale: &StaleFilesReport, dead: &DeadCodeReport) -> Vec<DeletionCandidate> {
    let mut per_file: HashMap<&Path, usize> = HashMap::new();
    for symbol in &dead.unreachable {
        *per_file.entry(symbol.file.as_path()).or_default() += 1;
    }

    let mut candidates: Vec<DeletionCandidate> = stale
        .stale_files
        .iter()
        .filter_map(|file| {
            let count = per_file.get(file.path.as_path()).copied()?;
            Some(DeletionCandidate {
                path: file.path.clone(),
                days_idle: file.days_idle,
                unreachable_symbols: count,
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.unreachable_symbols
            .cmp(&a.unreachable_symbols)
            .then_with(|| b.days_idle.cmp(&a.days_idle))
            .then_with(|| a.path.cmp(&b.path))
    });
    candidates
}
