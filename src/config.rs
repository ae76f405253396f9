//! Index configuration.
//!
//! Loaded from `<root>/.polyindex/config.json` when present. Every field has a
//! default, so a partial file (or none at all) is valid. CLI flags and tool
//! call options are layered on top through [`ConfigOverrides`].

use crate::error::IndexError;
use crate::linker::AmbiguityPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (relative to the project root) holding index configuration.
pub const CONFIG_DIR: &str = ".polyindex";
/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// Named options for scanning, analysis and sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Days without a commit before a file counts as stale
    pub stale_days: i64,
    pub file_capacity: usize,
    pub query_capacity: usize,
    pub edit_capacity: usize,
    /// Idle seconds before a session expires
    pub session_expiry: u64,
    pub max_sessions: usize,
    pub ambiguity: AmbiguityPolicy,
    pub scan_workers: usize,
    /// Seconds allowed for the version-control log read
    pub history_timeout: u64,
    /// Extra entry file globs, relative to the root
    pub entry_files: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            stale_days: 90,
            file_capacity: 50,
            query_capacity: 20,
            edit_capacity: 20,
            session_expiry: 3600,
            max_sessions: 256,
            ambiguity: AmbiguityPolicy::default(),
            scan_workers: default_workers(),
            history_timeout: 30,
            entry_files: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl IndexConfig {
    /// Path of the configuration file for a project root.
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load the project configuration, falling back to defaults when the file
    /// is absent. The result is validated.
    pub fn load(root: &Path) -> Result<Self, IndexError> {
        let path = Self::path_for(root);
        let config = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            let config: Self = serde_json::from_str(&text).map_err(|e| {
                IndexError::config(format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            config
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject option values no operation can run with.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.stale_days < 0 {
            return Err(IndexError::config(format!(
                "stale_days must be non-negative, got {}",
                self.stale_days
            )));
        }
        for (name, value) in [
            ("file_capacity", self.file_capacity),
            ("query_capacity", self.query_capacity),
            ("edit_capacity", self.edit_capacity),
            ("max_sessions", self.max_sessions),
            ("scan_workers", self.scan_workers),
        ] {
            if value == 0 {
                return Err(IndexError::config(format!("{name} must be at least 1")));
            }
        }
        if self.session_expiry == 0 {
            return Err(IndexError::config("session_expiry must be at least 1 second"));
        }
        if self.history_timeout == 0 {
            return Err(IndexError::config("history_timeout must be at least 1 second"));
        }
        for pattern in self.entry_files.iter().chain(&self.include).chain(&self.exclude) {
            globset::Glob::new(pattern)
                .map_err(|e| IndexError::config(format!("bad glob {pattern:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session_expiry)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history_timeout)
    }

    /// Apply overrides and validate the result. `self` is left untouched on
    /// error.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Result<Self, IndexError> {
        let mut next = self.clone();
        if let Some(v) = overrides.stale_days {
            next.stale_days = v;
        }
        if let Some(v) = overrides.file_capacity {
            next.file_capacity = v;
        }
        if let Some(v) = overrides.query_capacity {
            next.query_capacity = v;
        }
        if let Some(v) = overrides.edit_capacity {
            next.edit_capacity = v;
        }
        if let Some(v) = overrides.session_expiry {
            next.session_expiry = v;
        }
        if let Some(v) = overrides.ambiguity {
            next.ambiguity = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Per-call option overrides, as passed by CLI flags or tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub stale_days: Option<i64>,
    pub file_capacity: Option<usize>,
    pub query_capacity: Option<usize>,
    pub edit_capacity: Option<usize>,
    pub session_expiry: Option<u64>,
    pub ambiguity: Option<AmbiguityPolicy>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexConfig::default();
        assert_eq!(config.stale_days, 90);
        assert_eq!(config.file_capacity, 50);
        assert_eq!(config.query_capacity, 20);
        assert_eq!(config.edit_capacity, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_stale_days_rejected() {
        let config = IndexConfig {
            stale_days: -1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IndexError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = IndexConfig {
            query_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("query_capacity"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            IndexConfig::path_for(dir.path()),
            r#"{"stale_days": 30, "ambiguity": "unique_only"}"#,
        )
        .unwrap();

        let config = IndexConfig::load(dir.path()).unwrap();
        assert_eq!(config.stale_days, 30);
        assert_eq!(config.ambiguity, AmbiguityPolicy::UniqueOnly);
        assert_eq!(config.file_capacity, 50);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::load(dir.path()).unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_load_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(IndexConfig::path_for(dir.path()), r#"{"edit_capacity": 0}"#).unwrap();
        assert!(IndexConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_overrides_validate() {
        let base = IndexConfig::default();
        let ok = base
            .with_overrides(&ConfigOverrides {
                stale_days: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ok.stale_days, 7);

        let bad = base.with_overrides(&ConfigOverrides {
            stale_days: Some(-5),
            ..Default::default()
        });
        assert!(bad.is_err());
        assert_eq!(base.stale_days, 90);
    }
}
