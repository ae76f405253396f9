//! Property-based tests for polyindex.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use polyindex::parsing::LanguageScanner;
use polyindex::parsing::SourceFile;
use polyindex::parsing::routes::normalize_route;
use polyindex::parsing::rust::RustScanner;
use polyindex::session::{RecencyList, SessionStore};
use polyindex::*;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Generate valid Rust identifiers
fn rust_identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,20}".prop_filter("must be valid identifier", |s| {
        ![
            "fn", "let", "mut", "pub", "struct", "enum", "impl", "trait", "use", "mod",
            "const", "static", "async", "await", "self", "super", "crate", "where", "for",
            "in", "if", "else", "match", "loop", "while", "break", "continue", "return",
            "type", "as", "ref", "move", "dyn", "true", "false", "do", "box", "try", "gen",
            "yield", "macro", "union", "unsafe", "extern", "abstract", "final", "override",
            "priv", "typeof", "unsized", "virtual", "become", "macro_rules",
        ]
        .contains(&s.as_str())
    })
}

fn symbol(id: u32, exported: bool) -> Symbol {
    Symbol {
        id: SymbolId(id),
        name: format!("f{id}"),
        qualified_name: format!("lib.rs::f{id}"),
        kind: SymbolKind::Function,
        language: Language::Rust,
        file: PathBuf::from("lib.rs"),
        lines: LineRange::new(id as usize + 1, id as usize + 1),
        exported,
        in_test: false,
        signature: None,
        parent: None,
    }
}

fn dependency(source: u32, target: Option<u32>, import: bool) -> Dependency {
    Dependency {
        source: SymbolId(source),
        target: target.map(SymbolId),
        reference: TargetDescriptor::name("x"),
        kind: if import {
            DependencyKind::Import
        } else {
            DependencyKind::Call
        },
        cross_language: false,
        confidence: Confidence::Heuristic,
        line: 1,
    }
}

/// A graph of `n` functions: exported flags plus (source, target, is_import)
/// edges, where a target of `n` stands for a dangling reference.
fn random_graph() -> impl Strategy<Value = (Vec<bool>, Vec<(u32, u32, bool)>)> {
    (1u32..30).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::bool::weighted(0.2), n as usize),
            prop::collection::vec((0..n, 0..=n, prop::bool::weighted(0.3)), 0..60),
        )
    })
}

/// Reachable ids by naive fixpoint iteration.
fn reference_reachable(exported: &[bool], edges: &[(u32, u32, bool)]) -> BTreeSet<u32> {
    let n = exported.len() as u32;
    let mut reached: BTreeSet<u32> = (0..n).filter(|&i| exported[i as usize]).collect();
    loop {
        let before = reached.len();
        for &(source, target, import) in edges {
            if !import && target < n && reached.contains(&source) {
                reached.insert(target);
            }
        }
        if reached.len() == before {
            return reached;
        }
    }
}

// ============================================================================
// Dead Code Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: unreachable symbols are exactly the complement of the fixpoint
    #[test]
    fn dead_code_matches_fixpoint((exported, edges) in random_graph()) {
        let n = exported.len() as u32;
        let symbols = (0..n).map(|i| symbol(i, exported[i as usize])).collect();
        let deps = edges
            .iter()
            .map(|&(s, t, import)| dependency(s, (t < n).then_some(t), import))
            .collect();
        let graph = ProjectGraph::new(symbols, deps).unwrap();

        let report = DeadCodeAnalyzer::new().analyze(&graph);
        let reachable = reference_reachable(&exported, &edges);
        let expected: Vec<u32> = (0..n).filter(|i| !reachable.contains(i)).collect();
        let actual: Vec<u32> = report.unreachable.iter().map(|s| s.id.0).collect();

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(report.summary.reachable + report.summary.unreachable, n as usize);
    }

    /// Property: adding an exported symbol never makes anything unreachable
    #[test]
    fn exporting_is_monotonic((exported, edges) in random_graph(), pick in any::<prop::sample::Index>()) {
        let n = exported.len() as u32;
        let build = |exported: &[bool]| {
            let symbols = (0..n).map(|i| symbol(i, exported[i as usize])).collect();
            let deps = edges
                .iter()
                .map(|&(s, t, import)| dependency(s, (t < n).then_some(t), import))
                .collect();
            ProjectGraph::new(symbols, deps).unwrap()
        };

        let before: HashSet<u32> = DeadCodeAnalyzer::new()
            .analyze(&build(&exported))
            .unreachable
            .iter()
            .map(|s| s.id.0)
            .collect();

        let mut more = exported.clone();
        more[pick.index(n as usize)] = true;
        let after: HashSet<u32> = DeadCodeAnalyzer::new()
            .analyze(&build(&more))
            .unreachable
            .iter()
            .map(|s| s.id.0)
            .collect();

        prop_assert!(after.is_subset(&before));
    }
}

// ============================================================================
// Recency Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the list behaves like a move-to-front vector truncated to capacity
    #[test]
    fn recency_matches_model(
        capacity in 1usize..8,
        touches in prop::collection::vec(0u8..12, 0..60)
    ) {
        let mut list = RecencyList::new(NonZeroUsize::new(capacity).unwrap());
        let mut model: Vec<u8> = Vec::new();

        for item in touches {
            let evicted = list.touch(item);

            model.retain(|&x| x != item);
            model.insert(0, item);
            let expected = if model.len() > capacity { model.pop() } else { None };

            prop_assert_eq!(evicted, expected);
            prop_assert_eq!(list.iter().copied().collect::<Vec<_>>(), model.clone());
            prop_assert!(list.len() <= capacity);
        }
    }

    /// Property: boost strictly decreases with file rank and never drops below baseline
    #[test]
    fn boost_decreases_with_rank(count in 1usize..50) {
        let store = SessionStore::new("/work", &IndexConfig::default()).unwrap();
        store.open("agent");
        for i in 0..count {
            store.add_file("agent", Path::new(&format!("f{i}.rs"))).unwrap();
        }

        let scores: Vec<f64> = (0..count)
            .rev()
            .map(|i| store.boost_score("agent", Path::new(&format!("f{i}.rs"))))
            .collect();
        for pair in scores.windows(2) {
            prop_assert!(pair[0] > pair[1]);
        }
        for score in scores {
            prop_assert!(score.is_finite());
            prop_assert!(score > BASELINE_BOOST);
        }
    }
}

// ============================================================================
// Route And Scanner Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Property: normalizing a normalized route changes nothing
    #[test]
    fn normalize_route_idempotent(raw in "(/[a-zA-Z0-9:{}<>_.-]{0,8}){1,5}/?(\\?[a-z=&]{0,6})?") {
        if let Some(once) = normalize_route(&raw) {
            prop_assert_eq!(normalize_route(&once), Some(once.clone()));
            prop_assert!(once.starts_with('/'));
            prop_assert!(once == "/" || !once.ends_with('/'));
        }
    }

    /// Property: equivalent parameter spellings normalize the same way
    #[test]
    fn parameter_spellings_agree(
        prefix in prop::collection::vec("[a-z]{1,6}", 1..4),
        param in "[a-z]{1,6}"
    ) {
        let base = format!("/{}", prefix.join("/"));
        let forms = [
            format!("{base}/:{param}"),
            format!("{base}/{{{param}}}"),
            format!("{base}/<{param}>"),
            format!("{base}/${{{param}}}"),
            format!("{base}/42"),
        ];
        let normalized: HashSet<Option<String>> = forms.iter().map(|f| normalize_route(f)).collect();
        prop_assert_eq!(normalized.len(), 1);
    }

    /// Property: every declared function is found exactly once
    #[test]
    fn rust_functions_are_all_declared(
        names in prop::collection::hash_set(rust_identifier(), 1..10),
        public in any::<bool>()
    ) {
        let vis = if public { "pub " } else { "" };
        let text: String = names
            .iter()
            .map(|n| format!("{vis}fn {n}() {{}}\n\n"))
            .collect();

        let fragment = RustScanner::new()
            .scan(&SourceFile::new("lib.rs", text))
            .unwrap();
        for name in &names {
            let declared: Vec<_> = fragment
                .symbols
                .iter()
                .filter(|s| &s.name == name && s.kind != SymbolKind::Module)
                .collect();
            prop_assert_eq!(declared.len(), 1, "{}", name);
            prop_assert_eq!(declared[0].kind, SymbolKind::Function);
            prop_assert_eq!(declared[0].exported, public);
        }
    }
}
