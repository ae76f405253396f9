//! Core types for the polyglot index.
//!
//! This module defines the shared graph model used across all layers:
//! - Symbols and their kinds/languages
//! - Dependencies (edges) with their resolution state
//! - Report records produced by the analyzers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for symbols in a [`crate::graph::ProjectGraph`].
///
/// Ids are dense ordinals assigned by the linker after sorting fragments by
/// path, so the same project always yields the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Source language a symbol was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Vue,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Vue => "vue",
        }
    }

    /// Languages that share one module system and name space for resolution.
    ///
    /// Vue script blocks are TypeScript/JavaScript, so plain name lookups are
    /// allowed across the three.
    pub fn family(&self) -> LanguageFamily {
        match self {
            Self::Rust => LanguageFamily::Rust,
            Self::TypeScript | Self::JavaScript | Self::Vue => LanguageFamily::Web,
            Self::Python => LanguageFamily::Python,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module system family of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    Rust,
    Web,
    Python,
}

/// Kind of symbol in the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    /// Classes, structs, enums and type aliases
    Class,
    Interface,
    /// UI component (JSX function component, Vue SFC)
    Component,
    Variable,
    Constant,
    /// Module or namespace, including the synthetic per-file module
    Module,
    /// Externally invocable HTTP route
    Route,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Component => "component",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Module => "module",
            Self::Route => "route",
        }
    }

    /// Whether a template usage may refer to a symbol of this kind.
    pub fn is_template_target(&self) -> bool {
        matches!(self, Self::Component | Self::Class | Self::Function)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Shift the range down by `offset` lines (for embedded blocks).
    pub fn offset(self, offset: usize) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }
}

/// A symbol definition in the project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    /// Simple name (e.g., "save")
    pub name: String,
    /// Project-unique qualified name (e.g., "src/store.ts::Store::save")
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: Language,
    /// File path relative to the project root
    pub file: PathBuf,
    pub lines: LineRange,
    /// Visible outside its declaring module
    pub exported: bool,
    /// Declared in a test file or marked as a test
    pub in_test: bool,
    pub signature: Option<String>,
    /// Enclosing symbol (methods -> class, items -> inline module)
    pub parent: Option<SymbolId>,
}

// ============================================================================
// Dependencies
// ============================================================================

/// Kind of dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Call,
    Import,
    Extends,
    Implements,
    Instantiates,
    TemplateReference,
    RouteInvocation,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Import => "import",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Instantiates => "instantiates",
            Self::TemplateReference => "template_reference",
            Self::RouteInvocation => "route_invocation",
        }
    }

    /// Whether following this edge keeps its target alive.
    ///
    /// An import on its own never does.
    pub fn keeps_alive(&self) -> bool {
        !matches!(self, Self::Import)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an edge target was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Resolved through a declared reference (same file, import, module path)
    Exact,
    /// Resolved (or not) by name/path pattern matching
    Heuristic,
}

/// What a reference points at before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// A symbol declared in the same file, by local key
    Local { key: String },
    /// A same-language symbol by simple name, optionally qualified by its owner
    Name {
        name: String,
        qualifier: Option<String>,
    },
    /// A module specifier as written in the import
    Module { specifier: String },
    /// A component or bound identifier used from a UI template
    Template { name: String },
    /// An HTTP route invoked by a client call (path already normalized)
    Route {
        method: Option<String>,
        path: String,
    },
}

impl TargetDescriptor {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    pub fn local(key: impl Into<String>) -> Self {
        Self::Local { key: key.into() }
    }

    pub fn module(specifier: impl Into<String>) -> Self {
        Self::Module {
            specifier: specifier.into(),
        }
    }

    pub fn template(name: impl Into<String>) -> Self {
        Self::Template { name: name.into() }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { key } => write!(f, "{key}"),
            Self::Name {
                name,
                qualifier: Some(q),
            } => write!(f, "{q}::{name}"),
            Self::Name { name, .. } => write!(f, "{name}"),
            Self::Module { specifier } => write!(f, "module {specifier}"),
            Self::Template { name } => write!(f, "<{name}>"),
            Self::Route {
                method: Some(m),
                path,
            } => write!(f, "{m} {path}"),
            Self::Route { path, .. } => write!(f, "{path}"),
        }
    }
}

/// A directed dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub source: SymbolId,
    /// Resolved target; `None` for a dangling reference
    pub target: Option<SymbolId>,
    /// The reference as written, kept for reporting
    pub reference: TargetDescriptor,
    pub kind: DependencyKind,
    pub cross_language: bool,
    pub confidence: Confidence,
    /// 1-based line of the reference in the source symbol's file
    pub line: usize,
}

impl Dependency {
    pub fn is_dangling(&self) -> bool {
        self.target.is_none()
    }
}

// ============================================================================
// Analysis Types
// ============================================================================

/// Result of dead code analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadCodeReport {
    /// Symbols not reachable from any root, ordered by file and line
    pub unreachable: Vec<Symbol>,
    /// Roots the traversal started from
    pub entry_points_used: Vec<Symbol>,
    pub summary: DeadCodeSummary,
}

/// Counters for a dead code pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadCodeSummary {
    pub total_symbols: usize,
    pub roots: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub dangling_edges: usize,
}

/// A file whose last commit is older than the staleness threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleFile {
    pub path: PathBuf,
    /// Unix timestamp (seconds) of the most recent commit touching the file
    pub last_modified: u64,
    pub days_idle: u64,
}

/// A stale file that also declares unreachable symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionCandidate {
    pub path: PathBuf,
    pub days_idle: u64,
    pub unreachable_symbols: usize,
}

/// Result of a stale file pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleFilesReport {
    pub stale_days: u64,
    /// Unix timestamp (seconds) the ages were measured against
    pub generated_at: u64,
    /// Ordered by idle days (descending), then path
    pub stale_files: Vec<StaleFile>,
    /// Files with no commit history, in path order
    pub untracked: Vec<PathBuf>,
    pub diagnostics: Vec<crate::error::HistoryLookupFailure>,
}
