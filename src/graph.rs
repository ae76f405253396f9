//! The assembled project graph.
//!
//! A `ProjectGraph` is built once per scan and never mutated afterwards;
//! a re-scan produces a new instance. Symbols are keyed by id, edges are kept
//! in their original order and the forward/reverse adjacency index is a
//! petgraph `DiGraph` whose edge weights point back into the edge list.

use crate::error::IndexError;
use crate::types::*;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Per-file facts kept alongside the symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub language: Language,
    /// Filesystem modification time, unix seconds
    pub modified: Option<u64>,
    /// Whether the scanner produced a fragment for this file
    pub parsed: bool,
}

/// Aggregate counts for a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub dangling_edges: usize,
    pub cross_language_edges: usize,
    pub entry_files: usize,
}

/// Immutable symbol/dependency graph for one scan of a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    symbols: BTreeMap<SymbolId, Symbol>,
    edges: Vec<Dependency>,
    index: DiGraph<SymbolId, usize>,
    nodes: HashMap<SymbolId, NodeIndex>,
    dangling_by_source: HashMap<SymbolId, Vec<usize>>,
    by_file: BTreeMap<PathBuf, Vec<SymbolId>>,
    by_name: HashMap<String, Vec<SymbolId>>,
    by_qualified_name: HashMap<String, SymbolId>,
    files: BTreeMap<PathBuf, FileInfo>,
    entry_files: BTreeSet<PathBuf>,
}

impl ProjectGraph {
    /// Assemble a graph, checking its invariants.
    ///
    /// Fails if ids repeat, a parent or edge source is missing, a resolved
    /// target is missing, or an unresolved edge claims exact confidence.
    pub fn new(symbols: Vec<Symbol>, edges: Vec<Dependency>) -> Result<Self, IndexError> {
        let mut graph = Self::default();

        for symbol in symbols {
            let id = symbol.id;
            if graph.symbols.contains_key(&id) {
                return Err(IndexError::InvalidGraph(format!("duplicate symbol id {id}")));
            }
            let node = graph.index.add_node(id);
            graph.nodes.insert(id, node);
            graph
                .by_file
                .entry(symbol.file.clone())
                .or_default()
                .push(id);
            graph.by_name.entry(symbol.name.clone()).or_default().push(id);
            graph
                .by_qualified_name
                .entry(symbol.qualified_name.clone())
                .or_insert(id);
            graph.files.entry(symbol.file.clone()).or_insert(FileInfo {
                language: symbol.language,
                modified: None,
                parsed: true,
            });
            graph.symbols.insert(id, symbol);
        }

        for symbol in graph.symbols.values() {
            if let Some(parent) = symbol.parent {
                if !graph.symbols.contains_key(&parent) {
                    return Err(IndexError::InvalidGraph(format!(
                        "symbol {} has missing parent {parent}",
                        symbol.id
                    )));
                }
            }
        }

        for (idx, edge) in edges.iter().enumerate() {
            let Some(&source) = graph.nodes.get(&edge.source) else {
                return Err(IndexError::InvalidGraph(format!(
                    "edge {idx} has missing source {}",
                    edge.source
                )));
            };
            match edge.target {
                Some(target) => {
                    let Some(&target) = graph.nodes.get(&target) else {
                        return Err(IndexError::InvalidGraph(format!(
                            "edge {idx} has missing target {target}"
                        )));
                    };
                    graph.index.add_edge(source, target, idx);
                }
                None => {
                    if edge.confidence == Confidence::Exact {
                        return Err(IndexError::InvalidGraph(format!(
                            "edge {idx} is unresolved but marked exact"
                        )));
                    }
                    graph
                        .dangling_by_source
                        .entry(edge.source)
                        .or_default()
                        .push(idx);
                }
            }
        }
        graph.edges = edges;

        for ids in graph.by_file.values_mut() {
            ids.sort_by_key(|id| (graph.symbols[id].lines.start, *id));
        }
        for ids in graph.by_name.values_mut() {
            ids.sort();
        }

        Ok(graph)
    }

    /// Attach per-file facts, including files that yielded no symbols.
    pub fn with_files(mut self, files: impl IntoIterator<Item = (PathBuf, FileInfo)>) -> Self {
        for (path, info) in files {
            self.files.insert(path, info);
        }
        self
    }

    /// Record which files are entry points of the project.
    pub fn with_entry_files(mut self, entry_files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.entry_files = entry_files.into_iter().collect();
        self
    }

    // ========================================================================
    // Symbol Queries
    // ========================================================================

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// All symbols in id order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols declared in a file, ordered by start line.
    pub fn symbols_in_file(&self, file: &Path) -> Vec<&Symbol> {
        self.by_file
            .get(file)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Symbols with the given simple name, in id order.
    pub fn find_by_name(&self, name: &str) -> Vec<&Symbol> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn find_by_qualified_name(&self, qualified: &str) -> Option<&Symbol> {
        self.by_qualified_name
            .get(qualified)
            .and_then(|id| self.symbols.get(id))
    }

    /// Children of a symbol (methods of a class, items of a module).
    pub fn children(&self, id: SymbolId) -> Vec<&Symbol> {
        let Some(symbol) = self.symbols.get(&id) else {
            return Vec::new();
        };
        self.symbols_in_file(&symbol.file)
            .into_iter()
            .filter(|s| s.parent == Some(id))
            .collect()
    }

    // ========================================================================
    // File Queries
    // ========================================================================

    /// Every scanned file, including files that failed to parse.
    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &FileInfo)> {
        self.files.iter()
    }

    pub fn file_info(&self, file: &Path) -> Option<&FileInfo> {
        self.files.get(file)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn entry_files(&self) -> &BTreeSet<PathBuf> {
        &self.entry_files
    }

    pub fn is_entry_file(&self, file: &Path) -> bool {
        self.entry_files.contains(file)
    }

    // ========================================================================
    // Edge Queries
    // ========================================================================

    /// All edges in their original order.
    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving a symbol, resolved and dangling, in edge order.
    pub fn outgoing(&self, id: SymbolId) -> Vec<&Dependency> {
        let mut indices: Vec<usize> = self
            .nodes
            .get(&id)
            .map(|&node| {
                self.index
                    .edges_directed(node, Direction::Outgoing)
                    .map(|e| *e.weight())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(dangling) = self.dangling_by_source.get(&id) {
            indices.extend(dangling);
        }
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.edges[i]).collect()
    }

    /// Resolved edges arriving at a symbol, in edge order.
    pub fn incoming(&self, id: SymbolId) -> Vec<&Dependency> {
        let mut indices: Vec<usize> = self
            .nodes
            .get(&id)
            .map(|&node| {
                self.index
                    .edges_directed(node, Direction::Incoming)
                    .map(|e| *e.weight())
                    .collect()
            })
            .unwrap_or_default();
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.edges[i]).collect()
    }

    /// Edges whose target could not be resolved.
    pub fn dangling(&self) -> impl Iterator<Item = &Dependency> {
        self.edges.iter().filter(|e| e.is_dangling())
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.files.len(),
            symbols: self.symbols.len(),
            edges: self.edges.len(),
            dangling_edges: self.dangling().count(),
            cross_language_edges: self.edges.iter().filter(|e| e.cross_language).count(),
            entry_files: self.entry_files.len(),
        }
    }
}
