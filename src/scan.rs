//! Project scan orchestration.
//!
//! Discovery, parallel per-file scanning on the blocking pool, entry-file
//! detection from manifests and conventions, then a single-threaded link.
//! A file that fails to read or parse is recorded and skipped; only a bad
//! configuration or an unreadable root fails the scan.

use crate::config::IndexConfig;
use crate::discovery::{FileDiscovery, glob_matcher};
use crate::error::{IndexError, ParseFailure};
use crate::graph::{FileInfo, GraphStats, ProjectGraph};
use crate::linker::Linker;
use crate::parsing::{FileFragment, ScannerRegistry, SourceFile, language_for_path};
use crate::types::Language;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directories never searched for manifests.
const MANIFEST_SKIP: &[&str] = &["target", "node_modules", "dist", "build", "venv", "__pycache__"];

const PYTHON_ENTRY_NAMES: &[&str] = &["main.py", "__main__.py", "manage.py", "app.py"];

/// Web entry points, relative to the root or a `package.json` directory.
const WEB_ENTRY_FILES: &[&str] = &[
    "index.ts", "index.tsx", "index.js",
    "src/main.ts", "src/main.tsx", "src/main.js",
    "src/index.ts", "src/index.tsx", "src/index.js",
    "src/App.vue",
];

/// Result of scanning a project.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub graph: ProjectGraph,
    /// Files that could not be read or parsed, sorted by path
    pub parse_failures: Vec<ParseFailure>,
    pub elapsed_ms: u64,
}

/// Serializable outline of a [`ScanReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    #[serde(flatten)]
    pub stats: GraphStats,
    pub parse_failures: Vec<ParseFailure>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            stats: self.graph.stats(),
            parse_failures: self.parse_failures.clone(),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Scans projects into graphs.
#[derive(Clone)]
pub struct ProjectScanner {
    config: IndexConfig,
    registry: ScannerRegistry,
}

struct FileOutcome {
    path: PathBuf,
    language: Language,
    modified: Option<u64>,
    result: Result<FileFragment, ParseFailure>,
}

impl ProjectScanner {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            registry: ScannerRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: ScannerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Scan every supported file under `root` and link the results.
    pub async fn scan(&self, root: &Path) -> Result<ScanReport, IndexError> {
        self.config.validate()?;
        let start = Instant::now();
        info!("Starting scan of {}", root.display());

        let discovery = self.discovery();
        let discover_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || discovery.discover(&discover_root))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(e)))??;
        info!("Discovered {} files", files.len());

        let outcomes: Vec<FileOutcome> = stream::iter(files)
            .map(|abs| {
                let rel = abs.strip_prefix(root).unwrap_or(&abs).to_path_buf();
                let language = language_for_path(&rel);
                let registry = self.registry.clone();
                async move {
                    let language = language?;
                    let path = rel.clone();
                    let handle =
                        tokio::task::spawn_blocking(move || scan_file(&registry, &abs, rel, language));
                    Some(match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => FileOutcome {
                            result: Err(ParseFailure::new(path.clone(), format!("scanner panicked: {e}"))),
                            path,
                            language,
                            modified: None,
                        },
                    })
                }
            })
            .buffer_unordered(self.config.scan_workers)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        self.assemble(root, outcomes, start).await
    }

    fn discovery(&self) -> FileDiscovery {
        let mut discovery = FileDiscovery::new().with_extensions(self.registry.extensions());
        for pattern in &self.config.include {
            discovery = discovery.with_include(pattern);
        }
        for pattern in &self.config.exclude {
            discovery = discovery.with_exclude(pattern);
        }
        discovery
    }

    async fn assemble(
        &self,
        root: &Path,
        mut outcomes: Vec<FileOutcome>,
        start: Instant,
    ) -> Result<ScanReport, IndexError> {
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut fragments = Vec::with_capacity(outcomes.len());
        let mut parse_failures = Vec::new();
        let mut files = BTreeMap::new();
        for outcome in outcomes {
            let parsed = outcome.result.is_ok();
            match outcome.result {
                Ok(fragment) => fragments.push(fragment),
                Err(failure) => {
                    warn!("Failed to scan {failure}");
                    parse_failures.push(failure);
                }
            }
            files.insert(
                outcome.path,
                FileInfo {
                    language: outcome.language,
                    modified: outcome.modified,
                    parsed,
                },
            );
        }

        let known: BTreeSet<PathBuf> = files.keys().cloned().collect();
        let entry_root = root.to_path_buf();
        let globs = self.config.entry_files.clone();
        let entry_files = tokio::task::spawn_blocking(move || detect_entry_files(&entry_root, &known, &globs))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(e)))??;
        debug!("Entry files: {:?}", entry_files);

        let modified = files
            .iter()
            .filter_map(|(path, info)| info.modified.map(|m| (path.clone(), m)));
        let graph = Linker::new(self.config.ambiguity)
            .with_modified(modified)
            .link(fragments)?
            .with_files(files)
            .with_entry_files(entry_files);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let stats = graph.stats();
        info!(
            "Scan complete: {} files, {} symbols, {} edges, {} parse failures in {}ms",
            stats.files,
            stats.symbols,
            stats.edges,
            parse_failures.len(),
            elapsed_ms
        );
        Ok(ScanReport {
            graph,
            parse_failures,
            elapsed_ms,
        })
    }
}

fn scan_file(registry: &ScannerRegistry, abs: &Path, rel: PathBuf, language: Language) -> FileOutcome {
    let modified = fs::metadata(abs)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    let result = match (registry.scanner_for(&rel), fs::read_to_string(abs)) {
        (Some(scanner), Ok(text)) => scanner.scan(&SourceFile::new(rel.clone(), text)),
        (None, _) => Err(ParseFailure::new(rel.clone(), "no scanner for this file type")),
        (_, Err(e)) => Err(ParseFailure::new(rel.clone(), format!("unreadable: {e}"))),
    };
    FileOutcome {
        path: rel,
        language,
        modified,
        result,
    }
}

// ============================================================================
// Entry Files
// ============================================================================

/// Entry files among `files` (relative paths) from manifests, naming
/// conventions and the configured globs.
pub fn detect_entry_files(
    root: &Path,
    files: &BTreeSet<PathBuf>,
    globs: &[String],
) -> Result<BTreeSet<PathBuf>, IndexError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut package_dirs = vec![PathBuf::new()];

    for manifest in find_manifests(root) {
        let base = manifest
            .parent()
            .and_then(|dir| dir.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let text = match fs::read_to_string(&manifest) {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot read {}: {e}", manifest.display());
                continue;
            }
        };
        match manifest.file_name().and_then(|n| n.to_str()) {
            Some("Cargo.toml") => {
                candidates.extend(cargo_entries(root, &base, &text));
            }
            Some("package.json") => {
                candidates.extend(package_json_entries(&base, &text));
                package_dirs.push(base);
            }
            Some("pyproject.toml") => {
                candidates.extend(pyproject_entries(&base, &text));
            }
            _ => {}
        }
    }

    for dir in &package_dirs {
        candidates.extend(WEB_ENTRY_FILES.iter().map(|f| dir.join(f)));
    }
    candidates.extend(
        files
            .iter()
            .filter(|f| {
                f.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| PYTHON_ENTRY_NAMES.contains(&n))
            })
            .cloned(),
    );

    let mut entries: BTreeSet<PathBuf> = candidates
        .into_iter()
        .map(|p| clean(&p))
        .filter(|p| files.contains(p))
        .collect();

    if !globs.is_empty() {
        let matcher = glob_matcher(globs)?;
        entries.extend(files.iter().filter(|f| matcher.is_match(f)).cloned());
    }
    Ok(entries)
}

fn find_manifests(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .max_depth(4)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with('.') || MANIFEST_SKIP.contains(&n))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.file_name().to_str(),
                Some("Cargo.toml" | "package.json" | "pyproject.toml")
            )
        })
        .map(|e| e.into_path())
        .collect()
}

/// `[lib] path`, `[[bin]] path`, `src/main.rs`, `src/lib.rs`, `src/bin/*.rs`.
fn cargo_entries(root: &Path, base: &Path, text: &str) -> Vec<PathBuf> {
    let manifest: toml::Value = match toml::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid Cargo.toml in {}: {e}", base.display());
            return Vec::new();
        }
    };

    let mut entries = vec![base.join("src/main.rs"), base.join("src/lib.rs")];
    if let Some(path) = manifest
        .get("lib")
        .and_then(|lib| lib.get("path"))
        .and_then(|p| p.as_str())
    {
        entries.push(base.join(path));
    }
    if let Some(bins) = manifest.get("bin").and_then(|b| b.as_array()) {
        entries.extend(
            bins.iter()
                .filter_map(|bin| bin.get("path").and_then(|p| p.as_str()))
                .map(|p| base.join(p)),
        );
    }

    let bin_dir = root.join(base).join("src/bin");
    entries.extend(
        WalkDir::new(&bin_dir)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|x| x == "rs"))
            .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf)),
    );
    entries
}

/// `main`, `module` and `bin`; built outputs map back to their sources.
fn package_json_entries(base: &Path, text: &str) -> Vec<PathBuf> {
    let manifest: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid package.json in {}: {e}", base.display());
            return Vec::new();
        }
    };

    let mut declared: Vec<&str> = ["main", "module"]
        .iter()
        .filter_map(|key| manifest.get(*key).and_then(|v| v.as_str()))
        .collect();
    match manifest.get("bin") {
        Some(serde_json::Value::String(bin)) => declared.push(bin),
        Some(serde_json::Value::Object(bins)) => {
            declared.extend(bins.values().filter_map(|v| v.as_str()));
        }
        _ => {}
    }

    let mut entries = Vec::new();
    for path in declared {
        let path = base.join(path.trim_start_matches("./"));
        entries.push(path.clone());
        // dist/index.js -> src/index.ts
        let source = PathBuf::from(
            path.to_string_lossy()
                .replacen("dist/", "src/", 1)
                .replacen("lib/", "src/", 1),
        );
        for ext in ["ts", "tsx", "js"] {
            entries.push(path.with_extension(ext));
            entries.push(source.with_extension(ext));
        }
    }
    entries
}

/// `[project.scripts]` / `[tool.poetry.scripts]` targets (`pkg.cli:main`).
fn pyproject_entries(base: &Path, text: &str) -> Vec<PathBuf> {
    let manifest: toml::Value = match toml::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid pyproject.toml in {}: {e}", base.display());
            return Vec::new();
        }
    };

    let tables = [
        manifest.get("project").and_then(|p| p.get("scripts")),
        manifest
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("scripts")),
    ];
    let mut entries = Vec::new();
    for table in tables.into_iter().flatten() {
        let Some(scripts) = table.as_table() else {
            continue;
        };
        for target in scripts.values().filter_map(|v| v.as_str()) {
            let module = target.split(':').next().unwrap_or(target).trim();
            let rel: PathBuf = module.split('.').collect();
            for prefix in [base.to_path_buf(), base.join("src")] {
                let dir = prefix.join(&rel);
                entries.push(dir.with_extension("py"));
                entries.push(dir.join("__init__.py"));
            }
        }
    }
    entries
}

/// Drop `.` components so manifest paths compare equal to discovered ones.
fn clean(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn file_set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_cargo_entries() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Cargo.toml",
            "[package]\nname = \"demo\"\n\n[[bin]]\nname = \"tool\"\npath = \"tools/tool.rs\"\n",
        );
        write(dir.path(), "src/bin/extra.rs", "fn main() {}");
        let files = file_set(&["src/main.rs", "src/bin/extra.rs", "tools/tool.rs", "src/util.rs"]);

        let entries = detect_entry_files(dir.path(), &files, &[]).unwrap();
        assert_eq!(entries, file_set(&["src/bin/extra.rs", "src/main.rs", "tools/tool.rs"]));
    }

    #[test]
    fn test_package_json_and_conventions() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "web/package.json",
            r#"{"name": "web", "main": "./dist/server.js", "bin": {"cli": "bin/cli.js"}}"#,
        );
        let files = file_set(&[
            "web/src/server.ts",
            "web/bin/cli.js",
            "web/src/App.vue",
            "web/src/util.ts",
            "api/manage.py",
            "api/models.py",
        ]);

        let entries = detect_entry_files(dir.path(), &files, &[]).unwrap();
        assert_eq!(
            entries,
            file_set(&["api/manage.py", "web/bin/cli.js", "web/src/App.vue", "web/src/server.ts"])
        );
    }

    #[test]
    fn test_pyproject_scripts_and_globs() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname = \"svc\"\n\n[project.scripts]\nsvc = \"svc.cli:main\"\n",
        );
        let files = file_set(&["src/svc/cli.py", "src/svc/jobs/nightly.py", "src/svc/core.py"]);

        let entries =
            detect_entry_files(dir.path(), &files, &["src/svc/jobs/*.py".to_string()]).unwrap();
        assert_eq!(entries, file_set(&["src/svc/cli.py", "src/svc/jobs/nightly.py"]));
    }

    #[tokio::test]
    async fn test_scan_records_failures_and_links() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Cargo.toml", "[package]\nname = \"demo\"\n");
        write(dir.path(), "src/main.rs", "mod util;\n\nfn main() {\n    util::greet();\n}\n");
        write(dir.path(), "src/util.rs", "pub fn greet() {}\n");
        write(dir.path(), "src/broken.rs", "fn broken( {\n");
        write(dir.path(), "notes.txt", "not code");

        let report = ProjectScanner::new(IndexConfig::default())
            .scan(dir.path())
            .await
            .unwrap();

        assert_eq!(report.parse_failures.len(), 1);
        assert_eq!(report.parse_failures[0].path, PathBuf::from("src/broken.rs"));
        assert_eq!(report.graph.file_count(), 3);
        assert!(!report.graph.file_info(Path::new("src/broken.rs")).unwrap().parsed);
        assert!(report.graph.symbols_in_file(Path::new("src/broken.rs")).is_empty());
        assert!(report.graph.is_entry_file(Path::new("src/main.rs")));

        let main = report.graph.find_by_qualified_name("src/main.rs::main").unwrap();
        let greet = report.graph.find_by_qualified_name("src/util.rs::greet").unwrap();
        assert!(report
            .graph
            .outgoing(main.id)
            .iter()
            .any(|e| e.target == Some(greet.id)));
    }

    #[tokio::test]
    async fn test_invalid_configuration_rejected_before_work() {
        let config = IndexConfig {
            file_capacity: 0,
            ..IndexConfig::default()
        };
        let err = ProjectScanner::new(config)
            .scan(Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidConfiguration(_)));
    }
}
