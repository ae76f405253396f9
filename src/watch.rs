//! Re-scan on file changes.
//!
//! A debounced `notify` watcher feeds change batches into a tokio task that
//! re-scans the workspace and publishes the new graph. Analyzers holding the
//! previous snapshot are unaffected.

use crate::error::IndexError;
use crate::parsing::language_for_path;
use crate::state::SharedState;
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::path::{Component, Path};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Manifests whose changes alter the entry files.
const MANIFESTS: &[&str] = &["Cargo.toml", "package.json", "pyproject.toml"];

/// Directories whose contents never affect the graph.
const IGNORED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "dist", "build", "venv"];

/// Keeps the watcher alive; dropping it stops watching.
pub struct WatchHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the state's root and re-scan after each debounced batch of relevant
/// changes. Must be called inside a tokio runtime.
pub fn spawn_watcher(state: SharedState, debounce: Duration) -> Result<WatchHandle, IndexError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    let root = state.root().to_path_buf();

    let handler_root = root.clone();
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let relevant = events
                .iter()
                .filter(|e| is_relevant(&handler_root, &e.path))
                .count();
            if relevant > 0 {
                // The receiver only goes away when the handle is dropped
                let _ = tx.send(relevant);
            }
        }
        Err(e) => warn!("File watcher error: {e}"),
    })
    .map_err(|e| IndexError::Watch(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| IndexError::Watch(e.to_string()))?;
    info!(root = %root.display(), "watching for changes");

    let task = tokio::spawn(async move {
        while let Some(mut changed) = rx.recv().await {
            // Coalesce batches that arrived while the last scan ran
            while let Ok(more) = rx.try_recv() {
                changed += more;
            }
            debug!(changed, "change batch received");
            if let Err(e) = state.rescan().await {
                warn!("Re-scan after change failed: {e}");
            }
        }
    });

    Ok(WatchHandle {
        _debouncer: debouncer,
        task,
    })
}

/// Source files and manifests outside hidden and build directories.
fn is_relevant(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let ignored = relative.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part.starts_with('.') || IGNORED_DIRS.contains(&part.as_ref())
        }
        _ => false,
    });
    if ignored {
        return false;
    }
    language_for_path(path).is_some()
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| MANIFESTS.contains(&n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::state::IndexState;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_relevance() {
        let root = Path::new("/repo");
        assert!(is_relevant(root, Path::new("/repo/src/lib.rs")));
        assert!(is_relevant(root, Path::new("/repo/web/App.vue")));
        assert!(is_relevant(root, Path::new("/repo/Cargo.toml")));
        assert!(!is_relevant(root, Path::new("/repo/README.md")));
        assert!(!is_relevant(root, Path::new("/repo/target/debug/build.rs")));
        assert!(!is_relevant(root, Path::new("/repo/.git/index")));
        assert!(!is_relevant(root, Path::new("/repo/.polyindex/config.json")));
    }

    #[tokio::test]
    async fn test_change_triggers_rescan() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn first() {}\n").unwrap();
        let state = Arc::new(IndexState::new(dir.path(), IndexConfig::default()).unwrap());
        state.rescan().await.unwrap();

        let handle = spawn_watcher(Arc::clone(&state), Duration::from_millis(50)).unwrap();
        std::fs::write(
            state.root().join("lib.rs"),
            "pub fn first() {}\npub fn second() {}\n",
        )
        .unwrap();

        let mut found = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if !state.graph().find_by_name("second").is_empty() {
                found = true;
                break;
            }
        }
        handle.stop();
        assert!(found, "graph was not re-published after the change");
    }
}
