//! Per-language scanning.
//!
//! Every scanner turns one file into a [`FileFragment`]: the symbols it
//! declares plus the references it makes, with every reference still
//! unresolved. Scanners see a single file and nothing else; cross-file and
//! cross-language resolution is the linker's job.
//!
//! Uses tree-sitter for the structural parse.

pub mod python;
pub mod routes;
pub mod rust;
pub mod typescript;
pub mod vue;

use crate::error::ParseFailure;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};

/// Local key of the synthetic per-file module symbol.
pub const MODULE_KEY: &str = "<module>";

/// A source file handed to a scanner.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the project root
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Capability every language scanner provides.
pub trait LanguageScanner: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// File extensions this scanner handles (lowercase, no dot).
    fn extensions(&self) -> &[&'static str];

    /// Extract declared symbols and unresolved references from one file.
    fn scan(&self, file: &SourceFile) -> Result<FileFragment, ParseFailure>;
}

// ============================================================================
// Fragments
// ============================================================================

/// A symbol as declared in its file, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSymbol {
    /// File-unique key (`Store::save`, `<module>`)
    pub key: String,
    pub name: String,
    pub kind: SymbolKind,
    pub lines: LineRange,
    pub exported: bool,
    pub in_test: bool,
    pub signature: Option<String>,
    /// Key of the enclosing symbol
    pub parent: Option<String>,
    /// Owning type name when the owner is declared in another file
    pub owner: Option<String>,
}

impl LocalSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, lines: LineRange) -> Self {
        Self {
            key: String::new(),
            name: name.into(),
            kind,
            lines,
            exported: false,
            in_test: false,
            signature: None,
            parent: None,
            owner: None,
        }
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn test(mut self, in_test: bool) -> Self {
        self.in_test = in_test;
        self
    }

    pub fn signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }

    pub fn parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }
}

/// A reference made from a symbol of the file.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEdge {
    /// Key of the referencing symbol
    pub source: String,
    pub reference: TargetDescriptor,
    pub kind: DependencyKind,
    pub line: usize,
}

/// Everything a scanner learned from one file.
#[derive(Debug, Clone)]
pub struct FileFragment {
    pub path: PathBuf,
    pub language: Language,
    /// Declared symbols; the module symbol is always first
    pub symbols: Vec<LocalSymbol>,
    pub edges: Vec<LocalEdge>,
}

impl FileFragment {
    pub fn symbol(&self, key: &str) -> Option<&LocalSymbol> {
        self.symbols.iter().find(|s| s.key == key)
    }
}

/// Incrementally assembles a [`FileFragment`].
///
/// Assigns file-unique keys (`Parent::name`, with `#2`, `#3` suffixes for
/// redeclarations) and applies the test-file convention to every symbol.
pub struct FragmentBuilder {
    path: PathBuf,
    language: Language,
    test_file: bool,
    symbols: Vec<LocalSymbol>,
    edges: Vec<LocalEdge>,
    keys: HashSet<String>,
    /// Bare identifier uses: (source key, name, line)
    references: Vec<(String, String, usize)>,
    line_offset: usize,
}

impl FragmentBuilder {
    pub fn new(path: &Path, language: Language, text: &str) -> Self {
        let test_file = is_test_path(path);
        let line_count = text.lines().count().max(1);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();
        let module = LocalSymbol {
            key: MODULE_KEY.to_string(),
            name: stem,
            kind: SymbolKind::Module,
            lines: LineRange::new(1, line_count),
            exported: false,
            in_test: test_file,
            signature: None,
            parent: None,
            owner: None,
        };
        let mut keys = HashSet::new();
        keys.insert(MODULE_KEY.to_string());
        Self {
            path: path.to_path_buf(),
            language,
            test_file,
            symbols: vec![module],
            edges: Vec::new(),
            keys,
            references: Vec::new(),
            line_offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_test_file(&self) -> bool {
        self.test_file
    }

    /// Shift every following symbol and edge down by `offset` lines. Used
    /// for blocks embedded in a larger file.
    pub fn set_line_offset(&mut self, offset: usize) {
        self.line_offset = offset;
    }

    /// Add a symbol and return its file-unique key.
    pub fn push(&mut self, mut symbol: LocalSymbol) -> String {
        let base = match (symbol.parent.as_deref(), symbol.owner.as_deref()) {
            (Some(parent), _) if parent != MODULE_KEY => format!("{parent}::{}", symbol.name),
            (_, Some(owner)) => format!("{owner}::{}", symbol.name),
            _ => symbol.name.clone(),
        };
        let mut key = base.clone();
        let mut n = 2;
        while self.keys.contains(&key) {
            key = format!("{base}#{n}");
            n += 1;
        }
        self.keys.insert(key.clone());

        if symbol.parent.as_deref() == Some(MODULE_KEY) {
            symbol.parent = None;
        }
        symbol.key = key.clone();
        symbol.lines = symbol.lines.offset(self.line_offset);
        symbol.in_test |= self.test_file;
        self.symbols.push(symbol);
        key
    }

    /// Add a reference from `source` (a key returned by [`Self::push`] or
    /// [`MODULE_KEY`]).
    pub fn edge(&mut self, source: &str, reference: TargetDescriptor, kind: DependencyKind, line: usize) {
        self.edges.push(LocalEdge {
            source: source.to_string(),
            reference,
            kind,
            line: line + self.line_offset,
        });
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut LocalSymbol> {
        self.symbols.iter_mut().find(|s| s.key == key)
    }

    /// Mark top-level symbols with the given name as exported.
    pub fn mark_exported(&mut self, name: &str) -> bool {
        let mut found = false;
        for symbol in &mut self.symbols {
            if symbol.parent.is_none() && symbol.key != MODULE_KEY && symbol.name == name {
                symbol.exported = true;
                found = true;
            }
        }
        found
    }

    /// Mark the children of every exported symbol as exported.
    pub fn propagate_exports(&mut self) {
        let exported: HashSet<String> = self
            .symbols
            .iter()
            .filter(|s| s.exported)
            .map(|s| s.key.clone())
            .collect();
        for symbol in &mut self.symbols {
            if let Some(parent) = &symbol.parent {
                if exported.contains(parent) {
                    symbol.exported = true;
                }
            }
        }
    }

    /// Record a bare identifier use (a callback passed by name, a constant
    /// read). Uses that name a symbol of this file become call edges when
    /// the fragment is finished; the rest are dropped.
    pub fn reference(&mut self, source: &str, name: &str, line: usize) {
        self.references
            .push((source.to_string(), name.to_string(), line + self.line_offset));
    }

    /// Symbol names of this file mapped to the key of their first
    /// declaration. Modules and routes are not referable by name.
    pub fn local_names(&self) -> HashMap<String, String> {
        let mut names = HashMap::new();
        for symbol in &self.symbols {
            if matches!(symbol.kind, SymbolKind::Module | SymbolKind::Route) {
                continue;
            }
            names
                .entry(symbol.name.clone())
                .or_insert_with(|| symbol.key.clone());
        }
        names
    }

    pub fn finish(mut self) -> FileFragment {
        let names = self.local_names();
        let mut seen = HashSet::new();
        for (source, name, line) in std::mem::take(&mut self.references) {
            let Some(key) = names.get(&name) else {
                continue;
            };
            if *key == source || !seen.insert((source.clone(), key.clone())) {
                continue;
            }
            self.edges.push(LocalEdge {
                source,
                reference: TargetDescriptor::local(key.clone()),
                kind: DependencyKind::Call,
                line,
            });
        }
        FileFragment {
            path: self.path,
            language: self.language,
            symbols: self.symbols,
            edges: self.edges,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The set of available scanners, looked up by file extension.
#[derive(Clone)]
pub struct ScannerRegistry {
    scanners: Vec<Arc<dyn LanguageScanner>>,
    by_extension: HashMap<&'static str, usize>,
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::new()
            .with_scanner(Arc::new(rust::RustScanner::new()))
            .with_scanner(Arc::new(typescript::TypeScriptScanner::new()))
            .with_scanner(Arc::new(python::PythonScanner::new()))
            .with_scanner(Arc::new(vue::VueScanner::new()))
    }
}

impl ScannerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Register a scanner. Later registrations win for shared extensions.
    pub fn with_scanner(mut self, scanner: Arc<dyn LanguageScanner>) -> Self {
        let idx = self.scanners.len();
        for ext in scanner.extensions() {
            self.by_extension.insert(*ext, idx);
        }
        self.scanners.push(scanner);
        self
    }

    pub fn scanner_for(&self, path: &Path) -> Option<&dyn LanguageScanner> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let idx = *self.by_extension.get(ext.as_str())?;
        Some(self.scanners[idx].as_ref())
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.scanner_for(path).is_some()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_extension.keys().copied()
    }
}

/// Language implied by a file extension.
pub fn language_for_path(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "rs" => Some(Language::Rust),
        "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
        "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
        "py" => Some(Language::Python),
        "vue" => Some(Language::Vue),
        _ => None,
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse `source`, failing on any syntax error.
pub(crate) fn parse_tree(
    language: tree_sitter::Language,
    source: &str,
    path: &Path,
) -> Result<Tree, ParseFailure> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| ParseFailure::new(path, format!("grammar unavailable: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseFailure::new(path, "parser produced no tree"))?;
    let root = tree.root_node();
    if root.has_error() {
        let failure = ParseFailure::new(path, "syntax error");
        return Err(match first_error(root) {
            Some(node) => failure.at_line(node.start_position().row + 1),
            None => failure,
        });
    }
    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Source text of a node.
pub(crate) fn text_of<'a>(bytes: &'a [u8], node: Node) -> &'a str {
    std::str::from_utf8(&bytes[node.start_byte()..node.end_byte()]).unwrap_or("")
}

/// Text of a named field of a node.
pub(crate) fn field_text<'a>(bytes: &'a [u8], node: Node, field: &str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text_of(bytes, n))
}

/// 1-based line range of a node.
pub(crate) fn lines_of(node: Node) -> LineRange {
    LineRange::new(node.start_position().row + 1, node.end_position().row + 1)
}

/// 1-based start line of a node.
pub(crate) fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Extract the last identifier from a node's text (`a::b::c` -> `c`).
pub(crate) fn last_ident_of(bytes: &[u8], node: Node) -> Option<String> {
    last_ident(text_of(bytes, node))
}

pub(crate) fn last_ident(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Contents of a string literal node without its quotes.
pub(crate) fn string_content(bytes: &[u8], node: Node) -> String {
    let text = text_of(bytes, node);
    let text = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// First line of a declaration, trimmed, as a signature.
pub(crate) fn signature_of(bytes: &[u8], node: Node) -> Option<String> {
    let text = text_of(bytes, node);
    let head = text.split('{').next().unwrap_or(text);
    let head = head.lines().next().unwrap_or(head).trim().trim_end_matches(':');
    (!head.is_empty()).then(|| head.to_string())
}

pub(crate) fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// `MAX_RETRIES`, `API_V2`
pub(crate) fn is_upper_snake(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether a path follows a test-file naming convention.
pub fn is_test_path(path: &Path) -> bool {
    let in_test_dir = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("tests" | "test" | "__tests__" | "spec")
        )
    });
    if in_test_dir {
        return true;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let stem = name.split('.').next().unwrap_or(name);
    name == "conftest.py"
        || (stem.starts_with("test_") && name.ends_with(".py"))
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || name.contains(".test.")
        || name.contains(".spec.")
}
