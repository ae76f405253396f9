//! Dead code analysis via global reachability.
//!
//! Mark-and-sweep over a [`ProjectGraph`]: roots are exported symbols, test
//! symbols and what entry files declare at top level; every resolved edge
//! whose kind keeps its target alive is followed. Whatever is left unmarked is
//! reported. Nothing is ever deleted.

use crate::graph::ProjectGraph;
use crate::types::{DeadCodeReport, DeadCodeSummary, Symbol, SymbolId, SymbolKind};
use std::collections::{HashSet, VecDeque};
use tracing::info;

/// Analyzes a project graph to detect unreachable symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadCodeAnalyzer;

impl DeadCodeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Performs dead code analysis on a graph snapshot.
    ///
    /// 1. Collect roots (exported, test, entry-file module and `main`)
    /// 2. BFS from the roots over live edges
    /// 3. Report every non-module symbol that was never marked
    pub fn analyze(&self, graph: &ProjectGraph) -> DeadCodeReport {
        let roots = self.identify_roots(graph);
        let reachable = self.compute_reachable(graph, &roots);

        let mut unreachable: Vec<Symbol> = graph
            .symbols()
            .filter(|s| s.kind != SymbolKind::Module && !reachable.contains(&s.id))
            .cloned()
            .collect();
        unreachable.sort_by(|a, b| {
            (&a.file, a.lines.start, a.id).cmp(&(&b.file, b.lines.start, b.id))
        });

        let entry_points_used: Vec<Symbol> = roots
            .iter()
            .filter_map(|id| graph.get(*id))
            .cloned()
            .collect();

        let summary = DeadCodeSummary {
            total_symbols: graph.symbol_count(),
            roots: roots.len(),
            reachable: reachable.len(),
            unreachable: unreachable.len(),
            dangling_edges: graph.dangling().count(),
        };
        info!(
            roots = summary.roots,
            reachable = summary.reachable,
            unreachable = summary.unreachable,
            "dead code analysis complete"
        );

        DeadCodeReport {
            unreachable,
            entry_points_used,
            summary,
        }
    }

    /// Roots in id order.
    fn identify_roots(&self, graph: &ProjectGraph) -> Vec<SymbolId> {
        graph
            .symbols()
            .filter(|s| self.is_root(graph, s))
            .map(|s| s.id)
            .collect()
    }

    fn is_root(&self, graph: &ProjectGraph, symbol: &Symbol) -> bool {
        if symbol.exported || symbol.in_test {
            return true;
        }
        if !graph.is_entry_file(&symbol.file) {
            return false;
        }
        // The module symbol carries top-level statements of the entry file
        match symbol.kind {
            SymbolKind::Module => symbol.parent.is_none(),
            SymbolKind::Function => symbol.name == "main",
            _ => false,
        }
    }

    /// Marks everything reachable from `roots`.
    ///
    /// Only resolved edges whose kind keeps a target alive are followed;
    /// heuristic edges count the same as exact ones. A reachable member keeps
    /// its enclosing symbol alive.
    fn compute_reachable(&self, graph: &ProjectGraph, roots: &[SymbolId]) -> HashSet<SymbolId> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();

        for &root in roots {
            if reachable.insert(root) {
                queue.push_back(root);
            }
        }

        while let Some(current) = queue.pop_front() {
            for edge in graph.outgoing(current) {
                let Some(target) = edge.target else {
                    continue;
                };
                if edge.kind.keeps_alive() && reachable.insert(target) {
                    queue.push_back(target);
                }
            }

            if let Some(parent) = graph.get(current).and_then(|s| s.parent) {
                if reachable.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        reachable
    }
}
