//! Cross-file and cross-language reference resolution.
//!
//! The linker merges per-file fragments into one [`ProjectGraph`]. Fragments
//! are sorted by path before ids are handed out, so ids depend only on the
//! project contents and never on scan scheduling. Every reference a scanner
//! recorded is then resolved against the merged symbol table:
//!
//! - `Local` keys resolve within the file (exact)
//! - `Module` specifiers resolve to the target file's module symbol (exact)
//! - `Name` lookups try the same file, then imported files (exact), then any
//!   symbol of the same language family (heuristic)
//! - `Template` and `Route` descriptors match by normalized name or path
//!   across all languages (heuristic)
//!
//! A reference that matches nothing stays in the graph as a dangling edge.

use crate::error::IndexError;
use crate::graph::ProjectGraph;
use crate::parsing::routes::{methods_compatible, parse_route_symbol_name};
use crate::parsing::{FileFragment, MODULE_KEY, is_capitalized};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// What to do when a heuristic lookup matches more than one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Prefer the deepest shared directory with the referencing file, then
    /// the most recently modified file; keep every survivor.
    #[default]
    Nearest,
    /// Keep every match as its own edge.
    KeepAll,
    /// Leave ambiguous references dangling.
    UniqueOnly,
}

const WEB_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts", "vue"];

/// Merges fragments into a graph.
#[derive(Debug, Clone, Default)]
pub struct Linker {
    policy: AmbiguityPolicy,
    modified: HashMap<PathBuf, u64>,
}

impl Linker {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        Self {
            policy,
            modified: HashMap::new(),
        }
    }

    /// File modification times (unix seconds) used by the `Nearest` tie-break.
    pub fn with_modified(mut self, modified: impl IntoIterator<Item = (PathBuf, u64)>) -> Self {
        self.modified.extend(modified);
        self
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    /// Merge `fragments`, assign ids and resolve every reference.
    pub fn link(&self, mut fragments: Vec<FileFragment>) -> Result<ProjectGraph, IndexError> {
        fragments.sort_by(|a, b| a.path.cmp(&b.path));
        fragments.dedup_by(|a, b| a.path == b.path);

        // Pass 1: ids and symbols
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut keys: Vec<HashMap<&str, SymbolId>> = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            let base = symbols.len();
            let mut ids = HashMap::with_capacity(fragment.symbols.len());
            for (i, local) in fragment.symbols.iter().enumerate() {
                ids.insert(local.key.as_str(), symbol_id(base + i)?);
            }
            let file = display_path(&fragment.path);
            for (i, local) in fragment.symbols.iter().enumerate() {
                let qualified_name = if local.key == MODULE_KEY {
                    file.clone()
                } else {
                    format!("{file}::{}", local.key)
                };
                symbols.push(Symbol {
                    id: symbol_id(base + i)?,
                    name: local.name.clone(),
                    qualified_name,
                    kind: local.kind,
                    language: fragment.language,
                    file: fragment.path.clone(),
                    lines: local.lines,
                    exported: local.exported,
                    in_test: local.in_test,
                    signature: local.signature.clone(),
                    parent: local.parent.as_deref().and_then(|p| ids.get(p).copied()),
                });
            }
            keys.push(ids);
        }

        let resolver = Resolver::new(self, &symbols, &fragments, &keys);

        // Pass 2: imports, so name lookups can prefer imported files
        let imported: Vec<HashSet<&Path>> = fragments
            .iter()
            .map(|fragment| {
                fragment
                    .edges
                    .iter()
                    .filter_map(|edge| match &edge.reference {
                        TargetDescriptor::Module { specifier } => {
                            resolver.module_file(fragment, specifier)
                        }
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        // Pass 3: every edge, in fragment order
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        for (idx, fragment) in fragments.iter().enumerate() {
            for local in &fragment.edges {
                let Some(&source) = keys[idx].get(local.source.as_str()) else {
                    debug!(
                        "dropping edge from unknown key {} in {}",
                        local.source,
                        fragment.path.display()
                    );
                    continue;
                };
                let resolution = match &local.reference {
                    TargetDescriptor::Local { key } => match keys[idx].get(key.as_str()) {
                        Some(&id) => Resolution::exact(vec![id]),
                        None => Resolution::dangling(),
                    },
                    TargetDescriptor::Module { specifier } => {
                        match resolver.module_file(fragment, specifier) {
                            Some(file) => Resolution::exact(resolver.module_symbol(file).into_iter().collect()),
                            None => Resolution::dangling(),
                        }
                    }
                    TargetDescriptor::Name { name, qualifier } => {
                        resolver.name(fragment, &imported[idx], name, qualifier.as_deref())
                    }
                    TargetDescriptor::Template { name } => resolver.template(fragment, name),
                    TargetDescriptor::Route { method, path } => {
                        resolver.route(fragment, method.as_deref(), path)
                    }
                };

                if resolution.targets.is_empty() {
                    if seen.insert((source, None, Some(local.reference.clone()), local.kind)) {
                        edges.push(Dependency {
                            source,
                            target: None,
                            reference: local.reference.clone(),
                            kind: local.kind,
                            cross_language: false,
                            confidence: Confidence::Heuristic,
                            line: local.line,
                        });
                    }
                    continue;
                }
                for target in resolution.targets {
                    if !seen.insert((source, Some(target), None, local.kind)) {
                        continue;
                    }
                    let cross_language =
                        symbols[source.index()].language != symbols[target.index()].language;
                    edges.push(Dependency {
                        source,
                        target: Some(target),
                        reference: local.reference.clone(),
                        kind: local.kind,
                        cross_language,
                        confidence: resolution.confidence,
                        line: local.line,
                    });
                }
            }
        }

        let dangling = edges.iter().filter(|e| e.is_dangling()).count();
        let cross = edges.iter().filter(|e| e.cross_language).count();
        info!(
            "Linked {} files: {} symbols, {} edges ({} dangling, {} cross-language)",
            fragments.len(),
            symbols.len(),
            edges.len(),
            dangling,
            cross
        );
        ProjectGraph::new(symbols, edges)
    }
}

fn symbol_id(n: usize) -> Result<SymbolId, IndexError> {
    u32::try_from(n)
        .map(SymbolId)
        .map_err(|_| IndexError::InvalidGraph("symbol id space exhausted".to_string()))
}

/// Forward-slash rendering of a relative path.
fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ============================================================================
// Resolution
// ============================================================================

struct Resolution {
    targets: Vec<SymbolId>,
    confidence: Confidence,
}

impl Resolution {
    fn exact(targets: Vec<SymbolId>) -> Self {
        Self {
            targets,
            confidence: Confidence::Exact,
        }
    }

    fn heuristic(targets: Vec<SymbolId>) -> Self {
        Self {
            targets,
            confidence: Confidence::Heuristic,
        }
    }

    fn dangling() -> Self {
        Self::heuristic(Vec::new())
    }
}

/// Lookup tables over the merged symbol list.
struct Resolver<'a> {
    linker: &'a Linker,
    symbols: &'a [Symbol],
    /// File path -> its module symbol
    modules: HashMap<&'a Path, SymbolId>,
    by_name: HashMap<&'a str, Vec<SymbolId>>,
    by_template: HashMap<String, Vec<SymbolId>>,
    /// (method, normalized path, route symbol)
    routes: Vec<(&'a str, &'a str, SymbolId)>,
}

impl<'a> Resolver<'a> {
    fn new(
        linker: &'a Linker,
        symbols: &'a [Symbol],
        fragments: &'a [FileFragment],
        keys: &[HashMap<&'a str, SymbolId>],
    ) -> Self {
        let modules = fragments
            .iter()
            .zip(keys)
            .filter_map(|(fragment, ids)| {
                ids.get(MODULE_KEY)
                    .map(|id| (fragment.path.as_path(), *id))
            })
            .collect();

        let mut by_name: HashMap<&str, Vec<SymbolId>> = HashMap::new();
        let mut by_template: HashMap<String, Vec<SymbolId>> = HashMap::new();
        let mut routes = Vec::new();
        for symbol in symbols {
            match symbol.kind {
                SymbolKind::Module => {}
                SymbolKind::Route => {
                    if let Some((method, path)) = parse_route_symbol_name(&symbol.name) {
                        routes.push((method, path, symbol.id));
                    }
                }
                kind => {
                    by_name.entry(symbol.name.as_str()).or_default().push(symbol.id);
                    if kind.is_template_target() {
                        by_template
                            .entry(template_key(&symbol.name))
                            .or_default()
                            .push(symbol.id);
                    }
                }
            }
        }

        Self {
            linker,
            symbols,
            modules,
            by_name,
            by_template,
            routes,
        }
    }

    fn symbol(&self, id: SymbolId) -> &'a Symbol {
        &self.symbols[id.index()]
    }

    fn has_file(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    fn module_symbol(&self, file: &Path) -> Option<SymbolId> {
        self.modules.get(file).copied()
    }

    /// Stored path of the file a module specifier points at.
    fn module_file(&self, from: &FileFragment, specifier: &str) -> Option<&'a Path> {
        let target = match from.language.family() {
            LanguageFamily::Web => self.resolve_web(&from.path, specifier),
            LanguageFamily::Python => self.resolve_python(&from.path, specifier),
            LanguageFamily::Rust => self.resolve_rust(&from.path, specifier),
        }?;
        self.modules.get_key_value(target.as_path()).map(|(path, _)| *path)
    }

    fn name(
        &self,
        from: &FileFragment,
        imported: &HashSet<&Path>,
        name: &str,
        qualifier: Option<&str>,
    ) -> Resolution {
        let family = from.language.family();
        let suffix = qualifier.map(|q| format!("::{q}::{name}"));
        let candidates: Vec<&Symbol> = self
            .by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|id| self.symbol(*id))
            .filter(|s| s.language.family() == family)
            .filter(|s| {
                suffix
                    .as_deref()
                    .is_none_or(|sfx| s.qualified_name.ends_with(sfx))
            })
            .collect();

        let same_file: Vec<SymbolId> = candidates
            .iter()
            .filter(|s| s.file == from.path)
            .map(|s| s.id)
            .collect();
        if !same_file.is_empty() {
            return Resolution::exact(self.choose(&from.path, same_file));
        }

        let via_import: Vec<SymbolId> = candidates
            .iter()
            .filter(|s| imported.contains(s.file.as_path()))
            .map(|s| s.id)
            .collect();
        if !via_import.is_empty() {
            return Resolution::exact(self.choose(&from.path, via_import));
        }

        let all = candidates.iter().map(|s| s.id).collect();
        Resolution::heuristic(self.choose(&from.path, all))
    }

    fn template(&self, from: &FileFragment, name: &str) -> Resolution {
        let same_file: Vec<SymbolId> = self
            .by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter(|id| self.symbol(**id).file == from.path)
            .copied()
            .collect();
        if !same_file.is_empty() {
            return Resolution::heuristic(self.choose(&from.path, same_file));
        }
        // Bare identifiers only bind inside their own component
        if !(is_capitalized(name) || name.contains('-')) {
            return Resolution::dangling();
        }
        let candidates = self
            .by_template
            .get(&template_key(name))
            .cloned()
            .unwrap_or_default();
        Resolution::heuristic(self.choose(&from.path, candidates))
    }

    fn route(&self, from: &FileFragment, method: Option<&str>, path: &str) -> Resolution {
        let candidates = self
            .routes
            .iter()
            .filter(|(route_method, route_path, _)| {
                *route_path == path && methods_compatible(method, Some(*route_method))
            })
            .map(|(_, _, id)| *id)
            .collect();
        Resolution::heuristic(self.choose(&from.path, candidates))
    }

    /// Apply the ambiguity policy to a candidate list.
    fn choose(&self, from: &Path, mut candidates: Vec<SymbolId>) -> Vec<SymbolId> {
        candidates.sort();
        candidates.dedup();
        if candidates.len() <= 1 {
            return candidates;
        }
        match self.linker.policy {
            AmbiguityPolicy::KeepAll => candidates,
            AmbiguityPolicy::UniqueOnly => {
                debug!(
                    "{} candidates for a reference from {}, leaving it unresolved",
                    candidates.len(),
                    from.display()
                );
                Vec::new()
            }
            AmbiguityPolicy::Nearest => {
                let depth = |id: &SymbolId| common_depth(from, &self.symbol(*id).file);
                let best = candidates.iter().map(depth).max().unwrap_or(0);
                candidates.retain(|id| depth(id) == best);

                let modified = |id: &SymbolId| {
                    self.linker
                        .modified
                        .get(&self.symbol(*id).file)
                        .copied()
                        .unwrap_or(0)
                };
                let newest = candidates.iter().map(modified).max().unwrap_or(0);
                candidates.retain(|id| modified(id) == newest);
                candidates
            }
        }
    }

    // ========================================================================
    // Module Paths
    // ========================================================================

    /// `./store`, `../lib/api.js`, `@/components/Card`
    fn resolve_web(&self, from: &Path, spec: &str) -> Option<PathBuf> {
        let base = match spec.strip_prefix("@/").or_else(|| spec.strip_prefix("~/")) {
            Some(rest) => source_root(from).join(rest),
            None => normalize(&parent_dir(from).join(spec)),
        };
        let mut stems = vec![base.clone()];
        // ESM imports name the emitted `.js` file
        if base
            .extension()
            .is_some_and(|e| matches!(e.to_str(), Some("js" | "jsx" | "mjs" | "cjs")))
        {
            stems.push(base.with_extension(""));
        }

        for stem in stems {
            if self.has_file(&stem) {
                return Some(stem);
            }
            let found = WEB_EXTENSIONS
                .iter()
                .map(|ext| with_suffix(&stem, ext))
                .chain(WEB_EXTENSIONS.iter().map(|ext| stem.join(format!("index.{ext}"))))
                .find(|p| self.has_file(p));
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// `.models.User`, `..util`, `pkg.sub.mod`. The longest prefix naming a
    /// module file or package wins.
    fn resolve_python(&self, from: &Path, spec: &str) -> Option<PathBuf> {
        let dots = spec.chars().take_while(|c| *c == '.').count();
        let parts: Vec<&str> = spec[dots..].split('.').filter(|p| !p.is_empty()).collect();
        let bases = if dots > 0 {
            let mut dir = parent_dir(from).to_path_buf();
            for _ in 1..dots {
                dir = dir.parent()?.to_path_buf();
            }
            vec![dir]
        } else {
            vec![PathBuf::new(), PathBuf::from("src")]
        };

        for base in bases {
            for k in (0..=parts.len()).rev() {
                let dir = parts[..k].iter().fold(base.clone(), |d, p| d.join(p));
                if k > 0 {
                    let file = with_suffix(&dir, "py");
                    if self.has_file(&file) {
                        return Some(file);
                    }
                }
                if k > 0 || dots > 0 {
                    let init = dir.join("__init__.py");
                    if self.has_file(&init) {
                        return Some(init);
                    }
                }
            }
        }
        None
    }

    /// `mod name`, `crate::a::B`, `self::x`, `super::super::y`.
    fn resolve_rust(&self, from: &Path, spec: &str) -> Option<PathBuf> {
        if let Some(name) = spec.strip_prefix("mod ") {
            return self.rust_module_file(&rust_module_dir(from).join(name));
        }

        let parts: Vec<&str> = spec.split("::").collect();
        let (mut dir, mut rest) = match parts.first().copied()? {
            "crate" => (self.rust_crate_root(from), &parts[1..]),
            "self" => (rust_module_dir(from), &parts[1..]),
            "super" => (rust_module_dir(from), &parts[..]),
            _ => return None,
        };
        while let Some((&"super", tail)) = rest.split_first() {
            dir = dir.parent()?.to_path_buf();
            rest = tail;
        }

        for k in (1..=rest.len()).rev() {
            let candidate = rest[..k].iter().fold(dir.clone(), |d, p| d.join(p));
            if let Some(file) = self.rust_module_file(&candidate) {
                return Some(file);
            }
        }
        // The path names items of `dir`'s own module
        if dir == rust_module_dir(from) {
            return Some(from.to_path_buf());
        }
        self.rust_module_file(&dir).or_else(|| {
            ["lib.rs", "main.rs"]
                .iter()
                .map(|f| dir.join(f))
                .find(|p| self.has_file(p))
        })
    }

    fn rust_module_file(&self, module: &Path) -> Option<PathBuf> {
        [with_suffix(module, "rs"), module.join("mod.rs")]
            .into_iter()
            .find(|p| self.has_file(p))
    }

    /// Nearest enclosing directory holding a crate root file.
    fn rust_crate_root(&self, from: &Path) -> PathBuf {
        parent_dir(from)
            .ancestors()
            .find(|dir| self.has_file(&dir.join("lib.rs")) || self.has_file(&dir.join("main.rs")))
            .map(Path::to_path_buf)
            .unwrap_or_else(|| parent_dir(from).to_path_buf())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Case-insensitive component name with `-` and `_` dropped
/// (`user-avatar`, `UserAvatar` and `user_avatar` agree).
fn template_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new(""))
}

/// `path` with `.ext` appended (unlike `with_extension`, keeps dotted stems).
fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Directory the `@/` alias points at: the nearest enclosing `src`.
fn source_root(from: &Path) -> PathBuf {
    parent_dir(from)
        .ancestors()
        .find(|dir| dir.file_name().is_some_and(|n| n == "src"))
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("src"))
}

/// Directory holding the child modules of a Rust source file.
fn rust_module_dir(file: &Path) -> PathBuf {
    let dir = parent_dir(file);
    match file.file_name().and_then(|n| n.to_str()) {
        Some("mod.rs" | "lib.rs" | "main.rs") => dir.to_path_buf(),
        _ => match file.file_stem() {
            Some(stem) => dir.join(stem),
            None => dir.to_path_buf(),
        },
    }
}

/// Number of leading directories two files share.
fn common_depth(a: &Path, b: &Path) -> usize {
    parent_dir(a)
        .components()
        .zip(parent_dir(b).components())
        .take_while(|(x, y)| x == y)
        .count()
}
