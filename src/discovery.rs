//! File discovery module.
//!
//! Enumerates the source files of a project while respecting .gitignore
//! rules, default build/vendor excludes and user globs, keeping only the
//! extensions some scanner understands.

use crate::error::IndexError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Discovers source files in a project.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Patterns that override the excludes
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    default_excludes: bool,
    include_hidden: bool,
    include_large: bool,
    /// Max file size (bytes) unless include_large is set
    max_file_size: u64,
    /// Lowercase extensions to keep; empty keeps everything
    extensions: HashSet<String>,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            default_excludes: true,
            include_hidden: false,
            include_large: false,
            max_file_size: 2 * 1024 * 1024,
            extensions: HashSet::new(),
        }
    }
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an include pattern.
    pub fn with_include(mut self, pattern: &str) -> Self {
        self.include_patterns.push(pattern.to_string());
        self
    }

    /// Add an exclude pattern.
    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.exclude_patterns.push(pattern.to_string());
        self
    }

    /// Only keep files with one of these extensions.
    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.extensions
            .extend(extensions.into_iter().map(|e| e.to_ascii_lowercase()));
        self
    }

    /// Disable default excludes.
    pub fn without_default_excludes(mut self) -> Self {
        self.default_excludes = false;
        self
    }

    pub fn include_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    pub fn include_large(mut self) -> Self {
        self.include_large = true;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Discover all matching files under `root`, sorted by path.
    ///
    /// Fails only when `root` itself cannot be enumerated or a glob is
    /// malformed; unreadable entries below it are logged and skipped.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, IndexError> {
        let metadata = fs::metadata(root).map_err(|e| IndexError::Enumeration {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(IndexError::Enumeration {
                path: root.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let default_excludes = if self.default_excludes {
            build_globset(default_exclude_patterns())?
        } else {
            build_globset(std::iter::empty())?
        };
        let user_excludes = build_globset(self.exclude_patterns.iter().map(String::as_str))?;
        let user_includes = build_globset(self.include_patterns.iter().map(String::as_str))?;

        let walker = WalkBuilder::new(root)
            .hidden(!self.include_hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            // Parse .gitignore even without a .git directory
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(path);
            if is_excluded(rel, &default_excludes, &user_excludes, &user_includes) {
                continue;
            }
            if self.has_wanted_extension(path) && self.within_size(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    /// Check the size limit (always true with `include_large`).
    pub fn within_size(&self, path: &Path) -> bool {
        if self.include_large {
            return true;
        }
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };
        metadata.len() <= self.max_file_size
    }
}

fn default_exclude_patterns() -> Vec<&'static str> {
    vec![
        "**/.git/**",
        "**/.polyindex/**",
        "**/target/**",
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/out/**",
        "**/coverage/**",
        "**/vendor/**",
        "**/.venv/**",
        "**/venv/**",
        "**/__pycache__/**",
        "**/.mypy_cache/**",
        "**/.pytest_cache/**",
        "**/.next/**",
        "**/.nuxt/**",
        "**/*.min.js",
        "**/*.d.ts",
    ]
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::config(format!("invalid glob {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::config(format!("invalid glob set: {e}")))
}

fn is_excluded(path: &Path, default: &GlobSet, user: &GlobSet, include: &GlobSet) -> bool {
    let is_included = include.is_match(path);
    let is_excluded = default.is_match(path) || user.is_match(path);
    is_excluded && !is_included
}

/// Glob matcher for user-supplied patterns (entry files).
pub fn glob_matcher(patterns: &[String]) -> Result<GlobSet, IndexError> {
    build_globset(patterns.iter().map(String::as_str))
}
