//! Error types.
//!
//! `IndexError` fails a call. Per-file problems that a scan or analysis
//! recovers from are recorded as diagnostics instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that fail an index operation at the call boundary.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("cannot enumerate files under {path}: {message}")]
    Enumeration { path: PathBuf, message: String },

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("file watcher failed: {0}")]
    Watch(String),

    #[error("invalid tool arguments: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// A file that could not be parsed. The scan continues without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: PathBuf,
    pub message: String,
    /// 1-based line of the first syntax error, when known
    pub line: Option<usize>,
}

impl ParseFailure {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.path.display(), line, self.message),
            None => write!(f, "{}: {}", self.path.display(), self.message),
        }
    }
}

/// A history lookup that failed or timed out. The file degrades to untracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLookupFailure {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for HistoryLookupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
